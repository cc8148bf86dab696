use crate::auth::{AuthError, User};
use crate::ipc::error::{auth_err, err, ok, store_err};
use crate::ipc::helpers::required_str;
use crate::ipc::types::{AppState, Request};
use serde_json::json;

#[derive(Clone, Copy)]
enum Entry {
    SignUp,
    SignIn,
}

fn handle_enter(state: &mut AppState, req: &Request, entry: Entry) -> serde_json::Value {
    if !state.session.has_provider() {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    }
    let email = match required_str(req, "email") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let password = match required_str(req, "password") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let result: Result<User, AuthError> = match entry {
        Entry::SignUp => state.session.sign_up(email, password).cloned(),
        Entry::SignIn => state.session.sign_in(email, password).cloned(),
    };
    let user = match result {
        Ok(u) => u,
        Err(e) => return auth_err(&req.id, &e),
    };

    let token = state.session.access_token().map(str::to_string);
    if let Some(store) = state.store.as_mut() {
        store.set_access_token(token);
        if let Err(e) = store.load(&user.id) {
            return store_err(&req.id, &e);
        }
    }
    ok(&req.id, json!({ "user": user }))
}

fn handle_session(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(&req.id, json!({ "user": state.session.current_user() }))
}

fn handle_sign_out(state: &mut AppState, req: &Request) -> serde_json::Value {
    state.session.sign_out();
    if let Some(store) = state.store.as_mut() {
        store.unload();
        store.set_access_token(None);
    }
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "auth.signUp" => Some(handle_enter(state, req, Entry::SignUp)),
        "auth.signIn" => Some(handle_enter(state, req, Entry::SignIn)),
        "auth.session" => Some(handle_session(state, req)),
        "auth.signOut" => Some(handle_sign_out(state, req)),
        _ => None,
    }
}
