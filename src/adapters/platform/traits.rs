//! Storage platform abstraction
//!
//! This module defines the operations the sync engine needs from the imaging
//! platform. Everything that touches containers goes through
//! [`StoragePlatform`] so the engine can run against the HTTP client in
//! production and an in-memory platform in tests.

use crate::domain::ids::ContainerId;
use crate::domain::session::{Acquisition, Project, Session, Subject, ViewRow};
use crate::domain::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// A taggable container
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TagTarget {
    Session(ContainerId),
    Acquisition(ContainerId),
    /// A file, addressed by its parent acquisition and file name
    File {
        acquisition: ContainerId,
        name: String,
    },
}

impl fmt::Display for TagTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagTarget::Session(id) => write!(f, "session {id}"),
            TagTarget::Acquisition(id) => write!(f, "acquisition {id}"),
            TagTarget::File { acquisition, name } => {
                write!(f, "file {name} on acquisition {acquisition}")
            }
        }
    }
}

/// How a bulk move treats sessions whose label already exists at the destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictMode {
    /// Leave the colliding source session where it is
    Skip,
    /// Move the source session's contents into the existing one
    Move,
}

/// Parameters of a project-level smart copy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectCopyRequest {
    /// Group of the new project
    pub group: String,
    /// Label of the new project
    pub label: String,
    /// Only acquisitions carrying this tag are copied
    pub include_tag: String,
}

/// A file on a container, used as a gear input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    /// Container type, e.g. `project`
    pub container_type: String,
    pub container_id: ContainerId,
    pub name: String,
}

/// A gear job to submit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    pub gear_id: ContainerId,
    /// Session the job runs against
    pub destination: ContainerId,
    pub inputs: BTreeMap<String, FileRef>,
    pub config: Value,
}

/// Imaging platform operations used by the sync engine
///
/// Errors come back as [`crate::domain::WbhiError::Platform`]. A move that
/// collides with an existing session must return
/// [`crate::domain::PlatformError::Conflict`] so callers can recover.
#[async_trait]
pub trait StoragePlatform: Send + Sync {
    /// Looks up a project by `<group>/<label>`
    async fn lookup_project(&self, path: &str) -> Result<Option<Project>>;

    /// Fetches a project, including its copy status
    async fn get_project(&self, id: &ContainerId) -> Result<Project>;

    /// Creates an empty project
    async fn create_project(&self, group: &str, label: &str) -> Result<Project>;

    /// Deletes a project and everything in it
    async fn delete_project(&self, id: &ContainerId) -> Result<()>;

    /// Lists every session in a project
    async fn list_sessions(&self, project: &ContainerId) -> Result<Vec<Session>>;

    async fn get_session(&self, id: &ContainerId) -> Result<Session>;

    /// Lists a session's acquisitions with their files
    async fn list_acquisitions(&self, session: &ContainerId) -> Result<Vec<Acquisition>>;

    async fn get_subject(&self, id: &ContainerId) -> Result<Subject>;

    /// Finds a subject in a project by label
    async fn find_subject(&self, project: &ContainerId, label: &str) -> Result<Option<Subject>>;

    /// Finds a session of a subject by label
    async fn find_session(&self, subject: &ContainerId, label: &str) -> Result<Option<Session>>;

    /// Adds a tag; adding a tag that is already present is a no-op
    async fn add_tag(&self, target: &TagTarget, tag: &str) -> Result<()>;

    /// Removes a tag; removing an absent tag is a no-op
    async fn delete_tag(&self, target: &TagTarget, tag: &str) -> Result<()>;

    async fn rename_subject(&self, id: &ContainerId, label: &str) -> Result<()>;

    /// Moves a session (with its subject label) into another project
    async fn move_session(&self, session: &ContainerId, project: &ContainerId) -> Result<()>;

    /// Moves sessions under an existing subject
    async fn bulk_move_sessions(
        &self,
        sessions: &[ContainerId],
        subject: &ContainerId,
        conflict: ConflictMode,
    ) -> Result<()>;

    /// Reads one row per acquisition of a project in a single request
    async fn read_view(&self, project: &ContainerId) -> Result<Vec<ViewRow>>;

    /// Starts a smart copy of `source` and returns the new project's ID
    async fn start_project_copy(
        &self,
        source: &ContainerId,
        request: &ProjectCopyRequest,
    ) -> Result<ContainerId>;

    /// Looks up a gear by `gears/<name>`
    async fn lookup_gear(&self, path: &str) -> Result<Option<ContainerId>>;

    /// Submits a gear job and returns the job ID
    async fn submit_job(&self, request: &JobRequest) -> Result<String>;
}
