//! Course structure and the catalog contract the engine reads it through.
//!
//! A course is a list of modules, each holding ordered sessions. The engine
//! only ever sees the flattened list (modules by order, then sessions by
//! order within each module).

use crate::week::Clock;
use crate::{Result, Session, SlotContent};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Course/session catalog lookups
#[async_trait]
pub trait SessionCatalog: Send + Sync {
    /// All sessions of a course in training order
    async fn get_flattened_sessions(&self, course_id: &str) -> Result<Vec<Session>>;

    /// Session a coach planned for today, one-on-one courses only
    async fn get_planned_session_for_today(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> Result<Option<String>>;

    /// Coach-filled content for a one-on-one slot
    async fn get_slot_content(
        &self,
        user_id: &str,
        course_id: &str,
        slot_id: &str,
    ) -> Result<Option<SlotContent>>;
}

/// How a course is delivered
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// Fixed linear order through the session list
    #[default]
    Linear,
    /// Sessions scheduled per day by a coach
    OneOnOne,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Module {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub order: u32,
    #[serde(default)]
    pub sessions: Vec<Session>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Course {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub delivery: DeliveryMode,
    #[serde(default)]
    pub modules: Vec<Module>,
    /// One-on-one slot content keyed by session id
    #[serde(default)]
    pub slots: BTreeMap<String, SlotContent>,
}

impl Course {
    /// Sessions ordered by module, then by position inside the module
    ///
    /// Sort is stable, so equal `order` values keep their authored order.
    pub fn flattened_sessions(&self) -> Vec<Session> {
        let mut modules: Vec<&Module> = self.modules.iter().collect();
        modules.sort_by_key(|m| m.order);

        let mut flattened = Vec::new();
        for module in modules {
            let mut sessions = module.sessions.clone();
            sessions.sort_by_key(|s| s.order);
            for mut session in sessions {
                if session.module_id.is_empty() {
                    session.module_id = module.id.clone();
                }
                flattened.push(session);
            }
        }
        flattened
    }

    /// Read a course definition from a JSON file
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let course: Course = serde_json::from_str(&contents)?;
        tracing::debug!("Loaded course {} from {:?}", course.id, path);
        Ok(course)
    }
}

/// Catalog reading `<dir>/<course_id>.json`
///
/// "Planned for today" is the first session whose `planned_date` is the
/// clock's current day.
pub struct FileCatalog {
    courses_dir: PathBuf,
    clock: Arc<dyn Clock>,
}

impl FileCatalog {
    pub fn new(courses_dir: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            courses_dir: courses_dir.into(),
            clock,
        }
    }

    /// Load a course, None when no file exists for it
    pub fn course(&self, course_id: &str) -> Result<Option<Course>> {
        let path = self.courses_dir.join(format!("{}.json", course_id));
        if !path.exists() {
            tracing::debug!("No course file at {:?}", path);
            return Ok(None);
        }
        Course::load_from(&path).map(Some)
    }
}

#[async_trait]
impl SessionCatalog for FileCatalog {
    async fn get_flattened_sessions(&self, course_id: &str) -> Result<Vec<Session>> {
        Ok(self
            .course(course_id)?
            .map(|course| course.flattened_sessions())
            .unwrap_or_default())
    }

    async fn get_planned_session_for_today(
        &self,
        _user_id: &str,
        course_id: &str,
    ) -> Result<Option<String>> {
        let today = self.clock.today();
        Ok(self.course(course_id)?.and_then(|course| {
            course
                .flattened_sessions()
                .into_iter()
                .find(|s| s.planned_date == Some(today))
                .map(|s| s.id)
        }))
    }

    async fn get_slot_content(
        &self,
        _user_id: &str,
        course_id: &str,
        slot_id: &str,
    ) -> Result<Option<SlotContent>> {
        Ok(self
            .course(course_id)?
            .and_then(|mut course| course.slots.remove(slot_id)))
    }
}

/// Catalog held in memory with explicit per-user plans
#[derive(Clone, Debug, Default)]
pub struct StaticCatalog {
    courses: HashMap<String, Course>,
    planned: HashMap<(String, String), String>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_course(mut self, course: Course) -> Self {
        self.courses.insert(course.id.clone(), course);
        self
    }

    pub fn plan_for_today(
        mut self,
        user_id: &str,
        course_id: &str,
        session_id: impl Into<String>,
    ) -> Self {
        self.planned.insert(
            (user_id.to_string(), course_id.to_string()),
            session_id.into(),
        );
        self
    }
}

#[async_trait]
impl SessionCatalog for StaticCatalog {
    async fn get_flattened_sessions(&self, course_id: &str) -> Result<Vec<Session>> {
        Ok(self
            .courses
            .get(course_id)
            .map(Course::flattened_sessions)
            .unwrap_or_default())
    }

    async fn get_planned_session_for_today(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> Result<Option<String>> {
        Ok(self
            .planned
            .get(&(user_id.to_string(), course_id.to_string()))
            .cloned())
    }

    async fn get_slot_content(
        &self,
        _user_id: &str,
        course_id: &str,
        slot_id: &str,
    ) -> Result<Option<SlotContent>> {
        Ok(self
            .courses
            .get(course_id)
            .and_then(|course| course.slots.get(slot_id).cloned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::week::FixedClock;
    use chrono::NaiveDate;

    fn session(id: &str, order: u32) -> Session {
        Session {
            id: id.into(),
            title: id.to_uppercase(),
            module_id: String::new(),
            order,
            exercises: vec![],
            planned_date: None,
        }
    }

    fn course() -> Course {
        Course {
            id: "c1".into(),
            title: "Strength".into(),
            delivery: DeliveryMode::Linear,
            modules: vec![
                Module {
                    id: "m2".into(),
                    title: "Block 2".into(),
                    order: 2,
                    sessions: vec![session("d", 1), session("c", 0)],
                },
                Module {
                    id: "m1".into(),
                    title: "Block 1".into(),
                    order: 1,
                    sessions: vec![session("b", 1), session("a", 0)],
                },
            ],
            slots: BTreeMap::new(),
        }
    }

    #[test]
    fn test_flatten_orders_modules_then_sessions() {
        let ids: Vec<String> = course()
            .flattened_sessions()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_flatten_fills_module_id() {
        let sessions = course().flattened_sessions();
        assert_eq!(sessions[0].module_id, "m1");
        assert_eq!(sessions[3].module_id, "m2");
    }

    #[tokio::test]
    async fn test_file_catalog() {
        let temp_dir = tempfile::tempdir().unwrap();
        let today = NaiveDate::from_ymd_opt(2024, 5, 16).unwrap();

        let mut course = course();
        course.modules[1].sessions[0].planned_date = Some(today);
        course.slots.insert(
            "b".into(),
            SlotContent {
                title: Some("Coach notes".into()),
                ..Default::default()
            },
        );
        std::fs::write(
            temp_dir.path().join("c1.json"),
            serde_json::to_string(&course).unwrap(),
        )
        .unwrap();

        let catalog = FileCatalog::new(temp_dir.path(), Arc::new(FixedClock::on(today)));

        assert_eq!(catalog.get_flattened_sessions("c1").await.unwrap().len(), 4);
        assert!(catalog.get_flattened_sessions("missing").await.unwrap().is_empty());
        assert_eq!(
            catalog
                .get_planned_session_for_today("u1", "c1")
                .await
                .unwrap()
                .as_deref(),
            Some("b")
        );
        let slot = catalog.get_slot_content("u1", "c1", "b").await.unwrap();
        assert_eq!(slot.unwrap().title.as_deref(), Some("Coach notes"));
    }

    #[tokio::test]
    async fn test_malformed_course_file_errors() {
        let temp_dir = tempfile::tempdir().unwrap();
        std::fs::write(temp_dir.path().join("bad.json"), "{ nope").unwrap();
        let catalog = FileCatalog::new(
            temp_dir.path(),
            Arc::new(FixedClock::on(NaiveDate::from_ymd_opt(2024, 5, 16).unwrap())),
        );
        assert!(catalog.get_flattened_sessions("bad").await.is_err());
    }

    #[tokio::test]
    async fn test_static_catalog_plans() {
        let catalog = StaticCatalog::new()
            .with_course(course())
            .plan_for_today("u1", "c1", "c");

        assert_eq!(
            catalog
                .get_planned_session_for_today("u1", "c1")
                .await
                .unwrap()
                .as_deref(),
            Some("c")
        );
        assert!(catalog
            .get_planned_session_for_today("u2", "c1")
            .await
            .unwrap()
            .is_none());
    }
}
