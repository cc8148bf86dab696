use serde::Serialize;

use crate::model::AwardBehavior;
use crate::theme::ThemeMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BehaviorCategory {
    Positive,
    Negative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Behavior {
    pub id: &'static str,
    pub name: &'static str,
    pub icon: &'static str,
    pub seasonal_icon: &'static str,
    pub points: i64,
    pub category: BehaviorCategory,
}

impl Behavior {
    const fn new(
        id: &'static str,
        name: &'static str,
        icon: &'static str,
        seasonal_icon: &'static str,
        points: i64,
    ) -> Self {
        let category = if points > 0 {
            BehaviorCategory::Positive
        } else {
            BehaviorCategory::Negative
        };
        Self {
            id,
            name,
            icon,
            seasonal_icon,
            points,
            category,
        }
    }

    pub fn icon_for(&self, mode: ThemeMode) -> &'static str {
        match mode {
            ThemeMode::Normal => self.icon,
            ThemeMode::Christmas => self.seasonal_icon,
        }
    }

    pub fn award(&self, mode: ThemeMode) -> AwardBehavior {
        AwardBehavior {
            name: self.name.to_string(),
            icon: self.icon_for(mode).to_string(),
            points: self.points,
        }
    }
}

pub const CATALOG: &[Behavior] = &[
    Behavior::new("on-task", "On Task", "📚", "🎄", 1),
    Behavior::new("participation", "Participation", "✋", "🔔", 1),
    Behavior::new("helping-others", "Helping Others", "🤝", "🎁", 2),
    Behavior::new("great-effort", "Great Effort", "💪", "⭐", 2),
    Behavior::new("kindness", "Kindness", "❤️", "🍪", 1),
    Behavior::new("problem-solving", "Problem Solving", "🧩", "🦌", 2),
    Behavior::new("off-task", "Off Task", "😴", "🥶", -1),
    Behavior::new("disruptive", "Disruptive", "📢", "🌨️", -2),
    Behavior::new("unprepared", "Unprepared", "🎒", "🧦", -1),
    Behavior::new("unkind", "Unkind", "😠", "🪨", -2),
];

pub fn find(id: &str) -> Option<&'static Behavior> {
    CATALOG.iter().find(|b| b.id == id)
}

/// Catalog lookup by display name, case-insensitive.
pub fn find_by_name(name: &str) -> Option<&'static Behavior> {
    let name = name.trim();
    CATALOG.iter().find(|b| b.name.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_ids_are_unique_and_signed() {
        for (i, a) in CATALOG.iter().enumerate() {
            assert_ne!(a.points, 0, "{} has no points", a.id);
            assert!(CATALOG[i + 1..].iter().all(|b| b.id != a.id), "duplicate {}", a.id);
        }
    }

    #[test]
    fn lookup_and_seasonal_icons() {
        let on_task = find("on-task").expect("on-task");
        assert_eq!(on_task.points, 1);
        assert_eq!(find_by_name("off task").map(|b| b.points), Some(-1));
        assert_eq!(on_task.award(ThemeMode::Christmas).icon, on_task.seasonal_icon);
        assert_eq!(on_task.award(ThemeMode::Normal).icon, on_task.icon);
    }
}
