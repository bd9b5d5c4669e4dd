//! In-memory storage platform
//!
//! A self-contained [`StoragePlatform`] used by the test suite and by dry
//! runs against fixture data. It follows the platform's observable rules:
//! moving a session into a project that already has a subject with the same
//! label is a conflict, smart copies only take acquisitions carrying the
//! include tag and drop tags on the copies, and tag writes are idempotent.

use super::traits::{
    ConflictMode, JobRequest, ProjectCopyRequest, StoragePlatform, TagTarget,
};
use crate::domain::ids::ContainerId;
use crate::domain::session::{
    Acquisition, CopyStatus, FileEntry, Project, Session, Subject, ViewRow,
};
use crate::domain::{PlatformError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

/// How project copies started on the memory platform behave
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CopyBehaviour {
    /// Content is copied and the project reports `Completed` at once
    #[default]
    Complete,
    /// Content is copied; the project reports `InProgress` for this many reads
    CompleteAfterPolls(u32),
    /// Nothing is copied and the project stays `InProgress`
    NeverComplete,
    /// Nothing is copied and the project reports `Failed`
    Fail,
}

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    projects: BTreeMap<ContainerId, Project>,
    subjects: BTreeMap<ContainerId, Subject>,
    sessions: BTreeMap<ContainerId, Session>,
    acquisitions: BTreeMap<ContainerId, Acquisition>,
    gears: BTreeMap<String, ContainerId>,
    jobs: Vec<JobRequest>,
    copy_behaviour: CopyBehaviour,
    copy_requests: Vec<(ContainerId, ProjectCopyRequest)>,
    polls_remaining: BTreeMap<ContainerId, u32>,
    failing_submissions: usize,
    mutations: usize,
}

impl State {
    fn new_id(&mut self, kind: &str) -> ContainerId {
        self.next_id += 1;
        ContainerId::sequential(kind, self.next_id)
    }

    fn project(&self, id: &ContainerId) -> Result<&Project> {
        self.projects
            .get(id)
            .ok_or_else(|| PlatformError::NotFound(format!("project {id}")).into())
    }

    fn session_mut(&mut self, id: &ContainerId) -> Result<&mut Session> {
        self.sessions
            .get_mut(id)
            .ok_or_else(|| PlatformError::NotFound(format!("session {id}")).into())
    }

    fn subject_by_label(&self, project: &ContainerId, label: &str) -> Option<&Subject> {
        self.subjects
            .values()
            .find(|s| &s.project == project && s.label == label)
    }

    fn insert_subject(&mut self, project: &ContainerId, label: &str) -> ContainerId {
        let id = self.new_id("sub");
        self.subjects.insert(
            id.clone(),
            Subject {
                id: id.clone(),
                project: project.clone(),
                label: label.to_string(),
            },
        );
        id
    }

    fn insert_project(&mut self, group: &str, label: &str, copy_status: CopyStatus) -> ContainerId {
        let id = self.new_id("prj");
        self.projects.insert(
            id.clone(),
            Project {
                id: id.clone(),
                group: group.to_string(),
                label: label.to_string(),
                copy_status,
            },
        );
        id
    }

    /// Places a session under `subject`, moving its acquisitions with it
    fn reparent_session(&mut self, session: &ContainerId, subject: &ContainerId) -> Result<()> {
        let project = self
            .subjects
            .get(subject)
            .map(|s| s.project.clone())
            .ok_or_else(|| PlatformError::NotFound(format!("subject {subject}")))?;
        let entry = self.session_mut(session)?;
        entry.subject = subject.clone();
        entry.project = project;
        Ok(())
    }

    fn copy_tagged_content(&mut self, source: &ContainerId, dest: &ContainerId, include_tag: &str) {
        let subjects: Vec<Subject> = self
            .subjects
            .values()
            .filter(|s| &s.project == source)
            .cloned()
            .collect();

        for subject in subjects {
            let mut dest_subject: Option<ContainerId> = None;
            let sessions: Vec<Session> = self
                .sessions
                .values()
                .filter(|s| s.subject == subject.id)
                .cloned()
                .collect();

            for session in sessions {
                let acquisitions: Vec<Acquisition> = self
                    .acquisitions
                    .values()
                    .filter(|a| a.session == session.id && a.has_tag(include_tag))
                    .cloned()
                    .collect();
                if acquisitions.is_empty() {
                    continue;
                }

                let subject_id = match &dest_subject {
                    Some(id) => id.clone(),
                    None => {
                        let id = self.insert_subject(dest, &subject.label);
                        dest_subject = Some(id.clone());
                        id
                    }
                };

                let session_id = self.new_id("ses");
                self.sessions.insert(
                    session_id.clone(),
                    Session {
                        id: session_id.clone(),
                        project: dest.clone(),
                        subject: subject_id,
                        label: session.label.clone(),
                        timestamp: session.timestamp,
                        tags: Vec::new(),
                    },
                );

                for acquisition in acquisitions {
                    let acq_id = self.new_id("acq");
                    let files = acquisition
                        .files
                        .iter()
                        .map(|f| FileEntry {
                            tags: Vec::new(),
                            ..f.clone()
                        })
                        .collect();
                    self.acquisitions.insert(
                        acq_id.clone(),
                        Acquisition {
                            id: acq_id,
                            session: session_id.clone(),
                            label: acquisition.label.clone(),
                            timestamp: acquisition.timestamp,
                            tags: Vec::new(),
                            files,
                        },
                    );
                }
            }
        }
    }

    fn tags_mut(&mut self, target: &TagTarget) -> Result<&mut Vec<String>> {
        match target {
            TagTarget::Session(id) => Ok(&mut self.session_mut(id)?.tags),
            TagTarget::Acquisition(id) => self
                .acquisitions
                .get_mut(id)
                .map(|a| &mut a.tags)
                .ok_or_else(|| PlatformError::NotFound(format!("acquisition {id}")).into()),
            TagTarget::File { acquisition, name } => self
                .acquisitions
                .get_mut(acquisition)
                .and_then(|a| a.files.iter_mut().find(|f| &f.name == name))
                .map(|f| &mut f.tags)
                .ok_or_else(|| PlatformError::NotFound(format!("{target}")).into()),
        }
    }
}

/// In-memory platform
#[derive(Debug, Default)]
pub struct MemoryPlatform {
    state: Mutex<State>,
}

impl MemoryPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Seeds a project
    pub fn add_project(&self, group: &str, label: &str) -> ContainerId {
        self.lock().insert_project(group, label, CopyStatus::None)
    }

    /// Seeds a subject
    pub fn add_subject(&self, project: &ContainerId, label: &str) -> ContainerId {
        self.lock().insert_subject(project, label)
    }

    /// Seeds a session under `subject`
    pub fn add_session(
        &self,
        subject: &ContainerId,
        label: &str,
        timestamp: Option<DateTime<Utc>>,
        tags: &[&str],
    ) -> ContainerId {
        let mut state = self.lock();
        let project = state
            .subjects
            .get(subject)
            .map(|s| s.project.clone())
            .unwrap_or_else(|| subject.clone());
        let id = state.new_id("ses");
        state.sessions.insert(
            id.clone(),
            Session {
                id: id.clone(),
                project,
                subject: subject.clone(),
                label: label.to_string(),
                timestamp,
                tags: tags.iter().map(|t| t.to_string()).collect(),
            },
        );
        id
    }

    /// Seeds an acquisition under `session`
    pub fn add_acquisition(
        &self,
        session: &ContainerId,
        label: &str,
        timestamp: Option<DateTime<Utc>>,
        files: Vec<FileEntry>,
    ) -> ContainerId {
        let mut state = self.lock();
        let id = state.new_id("acq");
        state.acquisitions.insert(
            id.clone(),
            Acquisition {
                id: id.clone(),
                session: session.clone(),
                label: label.to_string(),
                timestamp,
                tags: Vec::new(),
                files,
            },
        );
        id
    }

    /// Registers a gear under a lookup path such as `gears/deid-export`
    pub fn add_gear(&self, path: &str) -> ContainerId {
        let mut state = self.lock();
        let id = state.new_id("gear");
        state.gears.insert(path.to_string(), id.clone());
        id
    }

    pub fn set_copy_behaviour(&self, behaviour: CopyBehaviour) {
        self.lock().copy_behaviour = behaviour;
    }

    /// Makes the next `count` job submissions fail with a server error
    pub fn fail_next_submissions(&self, count: usize) {
        self.lock().failing_submissions = count;
    }

    pub fn project_by_path(&self, path: &str) -> Option<Project> {
        let (group, label) = path.split_once('/')?;
        self.lock()
            .projects
            .values()
            .find(|p| p.group == group && p.label == label)
            .cloned()
    }

    pub fn session(&self, id: &ContainerId) -> Option<Session> {
        self.lock().sessions.get(id).cloned()
    }

    pub fn subject(&self, id: &ContainerId) -> Option<Subject> {
        self.lock().subjects.get(id).cloned()
    }

    pub fn acquisition(&self, id: &ContainerId) -> Option<Acquisition> {
        self.lock().acquisitions.get(id).cloned()
    }

    /// Sessions of a project in creation order
    pub fn sessions_in(&self, project: &ContainerId) -> Vec<Session> {
        self.lock()
            .sessions
            .values()
            .filter(|s| &s.project == project)
            .cloned()
            .collect()
    }

    /// Subjects of a project in creation order
    pub fn subjects_in(&self, project: &ContainerId) -> Vec<Subject> {
        self.lock()
            .subjects
            .values()
            .filter(|s| &s.project == project)
            .cloned()
            .collect()
    }

    pub fn acquisitions_of(&self, session: &ContainerId) -> Vec<Acquisition> {
        self.lock()
            .acquisitions
            .values()
            .filter(|a| &a.session == session)
            .cloned()
            .collect()
    }

    pub fn submitted_jobs(&self) -> Vec<JobRequest> {
        self.lock().jobs.clone()
    }

    pub fn copy_requests(&self) -> Vec<(ContainerId, ProjectCopyRequest)> {
        self.lock().copy_requests.clone()
    }

    /// Number of write operations performed so far
    pub fn mutation_count(&self) -> usize {
        self.lock().mutations
    }
}

#[async_trait]
impl StoragePlatform for MemoryPlatform {
    async fn lookup_project(&self, path: &str) -> Result<Option<Project>> {
        Ok(self.project_by_path(path))
    }

    async fn get_project(&self, id: &ContainerId) -> Result<Project> {
        let mut state = self.lock();
        match state.polls_remaining.get(id).copied() {
            Some(0) => {
                state.polls_remaining.remove(id);
                if let Some(project) = state.projects.get_mut(id) {
                    project.copy_status = CopyStatus::Completed;
                }
            }
            Some(n) => {
                state.polls_remaining.insert(id.clone(), n - 1);
            }
            None => {}
        }
        state.project(id).cloned()
    }

    async fn create_project(&self, group: &str, label: &str) -> Result<Project> {
        let mut state = self.lock();
        if state
            .projects
            .values()
            .any(|p| p.group == group && p.label == label)
        {
            return Err(PlatformError::Conflict(format!("project {group}/{label} exists")).into());
        }
        state.mutations += 1;
        let id = state.insert_project(group, label, CopyStatus::None);
        state.project(&id).cloned()
    }

    async fn delete_project(&self, id: &ContainerId) -> Result<()> {
        let mut state = self.lock();
        state.project(id)?;
        state.mutations += 1;
        state.projects.remove(id);
        state.subjects.retain(|_, s| &s.project != id);
        let removed: Vec<ContainerId> = state
            .sessions
            .values()
            .filter(|s| &s.project == id)
            .map(|s| s.id.clone())
            .collect();
        state.sessions.retain(|_, s| &s.project != id);
        state.acquisitions.retain(|_, a| !removed.contains(&a.session));
        Ok(())
    }

    async fn list_sessions(&self, project: &ContainerId) -> Result<Vec<Session>> {
        self.lock().project(project)?;
        Ok(self.sessions_in(project))
    }

    async fn get_session(&self, id: &ContainerId) -> Result<Session> {
        self.session(id)
            .ok_or_else(|| PlatformError::NotFound(format!("session {id}")).into())
    }

    async fn list_acquisitions(&self, session: &ContainerId) -> Result<Vec<Acquisition>> {
        Ok(self.acquisitions_of(session))
    }

    async fn get_subject(&self, id: &ContainerId) -> Result<Subject> {
        self.subject(id)
            .ok_or_else(|| PlatformError::NotFound(format!("subject {id}")).into())
    }

    async fn find_subject(&self, project: &ContainerId, label: &str) -> Result<Option<Subject>> {
        Ok(self.lock().subject_by_label(project, label).cloned())
    }

    async fn find_session(&self, subject: &ContainerId, label: &str) -> Result<Option<Session>> {
        Ok(self
            .lock()
            .sessions
            .values()
            .find(|s| &s.subject == subject && s.label == label)
            .cloned())
    }

    async fn add_tag(&self, target: &TagTarget, tag: &str) -> Result<()> {
        let mut state = self.lock();
        let tags = state.tags_mut(target)?;
        if !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
        state.mutations += 1;
        Ok(())
    }

    async fn delete_tag(&self, target: &TagTarget, tag: &str) -> Result<()> {
        let mut state = self.lock();
        state.tags_mut(target)?.retain(|t| t != tag);
        state.mutations += 1;
        Ok(())
    }

    async fn rename_subject(&self, id: &ContainerId, label: &str) -> Result<()> {
        let mut state = self.lock();
        let subject = state
            .subjects
            .get_mut(id)
            .ok_or_else(|| PlatformError::NotFound(format!("subject {id}")))?;
        subject.label = label.to_string();
        state.mutations += 1;
        Ok(())
    }

    async fn move_session(&self, session: &ContainerId, project: &ContainerId) -> Result<()> {
        let mut state = self.lock();
        state.project(project)?;
        let current_subject = state
            .sessions
            .get(session)
            .map(|s| s.subject.clone())
            .ok_or_else(|| PlatformError::NotFound(format!("session {session}")))?;
        let label = state
            .subjects
            .get(&current_subject)
            .map(|s| s.label.clone())
            .ok_or_else(|| PlatformError::NotFound(format!("subject {current_subject}")))?;

        if state.subject_by_label(project, &label).is_some() {
            return Err(PlatformError::Conflict(format!(
                "subject {label} already exists in project {project}"
            ))
            .into());
        }

        state.mutations += 1;
        let subject = state.insert_subject(project, &label);
        state.reparent_session(session, &subject)
    }

    async fn bulk_move_sessions(
        &self,
        sessions: &[ContainerId],
        subject: &ContainerId,
        conflict: ConflictMode,
    ) -> Result<()> {
        let mut state = self.lock();
        if !state.subjects.contains_key(subject) {
            return Err(PlatformError::NotFound(format!("subject {subject}")).into());
        }
        state.mutations += 1;
        for session in sessions {
            let label = state
                .sessions
                .get(session)
                .map(|s| s.label.clone())
                .ok_or_else(|| PlatformError::NotFound(format!("session {session}")))?;
            let collides = state
                .sessions
                .values()
                .any(|s| &s.subject == subject && s.label == label && &s.id != session);
            if collides && conflict == ConflictMode::Skip {
                continue;
            }
            state.reparent_session(session, subject)?;
        }
        Ok(())
    }

    async fn read_view(&self, project: &ContainerId) -> Result<Vec<ViewRow>> {
        let state = self.lock();
        state.project(project)?;
        let mut rows = Vec::new();
        for session in state.sessions.values().filter(|s| &s.project == project) {
            let subject_label = state
                .subjects
                .get(&session.subject)
                .map(|s| s.label.clone())
                .unwrap_or_default();
            let acquisitions: Vec<&Acquisition> = state
                .acquisitions
                .values()
                .filter(|a| a.session == session.id)
                .collect();
            if acquisitions.is_empty() {
                rows.push(ViewRow {
                    subject_label: subject_label.clone(),
                    session_label: session.label.clone(),
                    session_timestamp: session.timestamp,
                    acquisition_label: None,
                });
            }
            for acquisition in acquisitions {
                rows.push(ViewRow {
                    subject_label: subject_label.clone(),
                    session_label: session.label.clone(),
                    session_timestamp: session.timestamp,
                    acquisition_label: Some(acquisition.label.clone()),
                });
            }
        }
        Ok(rows)
    }

    async fn start_project_copy(
        &self,
        source: &ContainerId,
        request: &ProjectCopyRequest,
    ) -> Result<ContainerId> {
        let mut state = self.lock();
        state.project(source)?;
        if state
            .projects
            .values()
            .any(|p| p.group == request.group && p.label == request.label)
        {
            return Err(PlatformError::Conflict(format!(
                "project {}/{} exists",
                request.group, request.label
            ))
            .into());
        }
        state.mutations += 1;
        state
            .copy_requests
            .push((source.clone(), request.clone()));

        let behaviour = state.copy_behaviour;
        let status = match behaviour {
            CopyBehaviour::Complete => CopyStatus::Completed,
            CopyBehaviour::Fail => CopyStatus::Failed,
            CopyBehaviour::CompleteAfterPolls(_) | CopyBehaviour::NeverComplete => {
                CopyStatus::InProgress
            }
        };
        let id = state.insert_project(&request.group, &request.label, status);

        match behaviour {
            CopyBehaviour::Complete => {
                state.copy_tagged_content(source, &id, &request.include_tag);
            }
            CopyBehaviour::CompleteAfterPolls(polls) => {
                state.copy_tagged_content(source, &id, &request.include_tag);
                state.polls_remaining.insert(id.clone(), polls);
            }
            CopyBehaviour::NeverComplete | CopyBehaviour::Fail => {}
        }
        Ok(id)
    }

    async fn lookup_gear(&self, path: &str) -> Result<Option<ContainerId>> {
        Ok(self.lock().gears.get(path).cloned())
    }

    async fn submit_job(&self, request: &JobRequest) -> Result<String> {
        let mut state = self.lock();
        if state.failing_submissions > 0 {
            state.failing_submissions -= 1;
            return Err(PlatformError::ServerError {
                status: 503,
                message: "job queue unavailable".to_string(),
            }
            .into());
        }
        state.mutations += 1;
        state.jobs.push(request.clone());
        Ok(format!("job-{}", state.jobs.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PlatformError, WbhiError};

    fn seeded() -> (MemoryPlatform, ContainerId, ContainerId, ContainerId) {
        let platform = MemoryPlatform::new();
        let inbound = platform.add_project("ucsd", "Inbound Data");
        let subject = platform.add_subject(&inbound, "sub01");
        let session = platform.add_session(&subject, "ses01", None, &[]);
        (platform, inbound, subject, session)
    }

    #[tokio::test]
    async fn test_move_session_into_empty_project() {
        let (platform, _, _, session) = seeded();
        let dest = platform.add_project("wbhi", "pre-deid");

        platform.move_session(&session, &dest).await.unwrap();

        let moved = platform.session(&session).unwrap();
        assert_eq!(moved.project, dest);
        assert_eq!(platform.subject(&moved.subject).unwrap().label, "sub01");
    }

    #[tokio::test]
    async fn test_move_session_conflicts_on_existing_subject() {
        let (platform, _, _, session) = seeded();
        let dest = platform.add_project("wbhi", "pre-deid");
        platform.add_subject(&dest, "sub01");

        let err = platform.move_session(&session, &dest).await.unwrap_err();
        assert!(matches!(err, WbhiError::Platform(PlatformError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_bulk_move_skips_colliding_labels() {
        let (platform, _, subject, session) = seeded();
        let other = platform.add_session(&subject, "ses02", None, &[]);
        let dest = platform.add_project("wbhi", "pre-deid");
        let dest_subject = platform.add_subject(&dest, "sub01");
        platform.add_session(&dest_subject, "ses01", None, &[]);

        platform
            .bulk_move_sessions(&[session.clone(), other.clone()], &dest_subject, ConflictMode::Skip)
            .await
            .unwrap();

        assert_eq!(platform.session(&session).unwrap().subject, subject);
        assert_eq!(platform.session(&other).unwrap().subject, dest_subject);
    }

    #[tokio::test]
    async fn test_copy_only_takes_tagged_acquisitions() {
        let (platform, inbound, _, session) = seeded();
        let tagged = platform.add_acquisition(&session, "T1w", None, Vec::new());
        platform.add_acquisition(&session, "BOLD", None, Vec::new());
        platform
            .add_tag(&TagTarget::Acquisition(tagged), "to_copy_x")
            .await
            .unwrap();

        let request = ProjectCopyRequest {
            group: "tmp".to_string(),
            label: "ucsd_x".to_string(),
            include_tag: "to_copy_x".to_string(),
        };
        let copy = platform.start_project_copy(&inbound, &request).await.unwrap();

        let rows = platform.read_view(&copy).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].acquisition_label.as_deref(), Some("T1w"));
        let copied = platform.sessions_in(&copy);
        assert!(copied[0].tags.is_empty());
    }

    #[tokio::test]
    async fn test_copy_completes_after_polls() {
        let (platform, inbound, _, _) = seeded();
        platform.set_copy_behaviour(CopyBehaviour::CompleteAfterPolls(1));
        let request = ProjectCopyRequest {
            group: "tmp".to_string(),
            label: "ucsd_x".to_string(),
            include_tag: "to_copy_x".to_string(),
        };
        let copy = platform.start_project_copy(&inbound, &request).await.unwrap();

        assert_eq!(
            platform.get_project(&copy).await.unwrap().copy_status,
            CopyStatus::InProgress
        );
        assert_eq!(
            platform.get_project(&copy).await.unwrap().copy_status,
            CopyStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_tags_are_idempotent() {
        let (platform, _, _, session) = seeded();
        let target = TagTarget::Session(session.clone());
        platform.add_tag(&target, "wbhi").await.unwrap();
        platform.add_tag(&target, "wbhi").await.unwrap();
        assert_eq!(platform.session(&session).unwrap().tags, vec!["wbhi"]);

        platform.delete_tag(&target, "absent").await.unwrap();
        platform.delete_tag(&target, "wbhi").await.unwrap();
        assert!(platform.session(&session).unwrap().tags.is_empty());
    }

    #[tokio::test]
    async fn test_delete_project_cascades() {
        let (platform, inbound, subject, session) = seeded();
        platform.add_acquisition(&session, "T1w", None, Vec::new());

        platform.delete_project(&inbound).await.unwrap();

        assert!(platform.session(&session).is_none());
        assert!(platform.subject(&subject).is_none());
        assert!(platform.acquisitions_of(&session).is_empty());
    }

    #[tokio::test]
    async fn test_failing_submissions() {
        let platform = MemoryPlatform::new();
        platform.fail_next_submissions(1);
        let request = JobRequest {
            gear_id: ContainerId::new("g1").unwrap(),
            destination: ContainerId::new("s1").unwrap(),
            inputs: BTreeMap::new(),
            config: serde_json::Value::Null,
        };

        assert!(platform.submit_job(&request).await.is_err());
        assert_eq!(platform.submit_job(&request).await.unwrap(), "job-1");
        assert_eq!(platform.submitted_jobs().len(), 1);
    }
}
