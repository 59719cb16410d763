//! Moderation actions.
//!
//! Each action is one Transport call. When the call succeeds the action
//! yields the [`LocalMutation`] the screen applies immediately, without
//! waiting for the push echo. A failed call yields no mutation.

use crate::error::{SyncError, SyncResult};
use crate::reconciler::LocalMutation;
use crate::transport::{Method, Transport};
use modboard_types::{EntityKind, RecordId};
use serde_json::{Map, Value, json};
use tracing::debug;

/// A mutating action on one record.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Delete a record of any kind.
    Delete(RecordId),
    /// Update fields of a record of any kind.
    Update(RecordId, Map<String, Value>),
    BanUser(RecordId),
    UnbanUser(RecordId),
    ApprovePost(RecordId),
    FlagPost(RecordId),
    ResolveReport(RecordId),
    DismissReport(RecordId),
    ApproveVerification(RecordId),
    RejectVerification(RecordId),
    VerifyBusiness(RecordId),
    /// Take ownership of a business listing for the admin team.
    AssignBusiness(RecordId),
    UnassignBusiness(RecordId),
}

/// Owner recorded on a business by [`Action::AssignBusiness`].
pub const ADMIN_OWNER: &str = "admin";

impl Action {
    /// The record the action targets.
    pub fn target(&self) -> &RecordId {
        match self {
            Self::Delete(id)
            | Self::Update(id, _)
            | Self::BanUser(id)
            | Self::UnbanUser(id)
            | Self::ApprovePost(id)
            | Self::FlagPost(id)
            | Self::ResolveReport(id)
            | Self::DismissReport(id)
            | Self::ApproveVerification(id)
            | Self::RejectVerification(id)
            | Self::VerifyBusiness(id)
            | Self::AssignBusiness(id)
            | Self::UnassignBusiness(id) => id,
        }
    }

    /// Short name for logs and the CLI.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Delete(_) => "delete",
            Self::Update(..) => "update",
            Self::BanUser(_) => "ban",
            Self::UnbanUser(_) => "unban",
            Self::ApprovePost(_) => "approve",
            Self::FlagPost(_) => "flag",
            Self::ResolveReport(_) => "resolve",
            Self::DismissReport(_) => "dismiss",
            Self::ApproveVerification(_) => "approve",
            Self::RejectVerification(_) => "reject",
            Self::VerifyBusiness(_) => "verify",
            Self::AssignBusiness(_) => "assign",
            Self::UnassignBusiness(_) => "unassign",
        }
    }

    /// The entity kind the action is restricted to, if any.
    pub fn required_kind(&self) -> Option<EntityKind> {
        match self {
            Self::Delete(_) | Self::Update(..) => None,
            Self::BanUser(_) | Self::UnbanUser(_) => Some(EntityKind::Users),
            Self::ApprovePost(_) | Self::FlagPost(_) => Some(EntityKind::Posts),
            Self::ResolveReport(_) | Self::DismissReport(_) => Some(EntityKind::Reports),
            Self::ApproveVerification(_) | Self::RejectVerification(_) => {
                Some(EntityKind::Verification)
            }
            Self::VerifyBusiness(_) | Self::AssignBusiness(_) | Self::UnassignBusiness(_) => {
                Some(EntityKind::Business)
            }
        }
    }

    /// Whether the action can run against a screen showing `kind`.
    pub fn applies_to(&self, kind: EntityKind) -> bool {
        self.required_kind().is_none_or(|required| required == kind)
    }

    /// HTTP method and path of the call.
    pub fn endpoint(&self, kind: EntityKind) -> (Method, String) {
        let item = kind.item_path(self.target());
        match self {
            Self::Delete(_) | Self::DismissReport(_) => (Method::Delete, item),
            Self::Update(..) | Self::AssignBusiness(_) | Self::UnassignBusiness(_) => {
                (Method::Patch, item)
            }
            _ => (Method::Patch, format!("{item}/{}", self.name())),
        }
    }

    /// Runs the call and returns the store change to apply on success.
    pub async fn execute(
        &self,
        transport: &dyn Transport,
        kind: EntityKind,
    ) -> SyncResult<LocalMutation> {
        if !self.applies_to(kind) {
            return Err(SyncError::Protocol(format!(
                "{} does not apply to {kind}",
                self.name()
            )));
        }

        let (method, path) = self.endpoint(kind);
        let body = match self {
            Self::Update(_, fields) => Some(Value::Object(fields.clone())),
            Self::AssignBusiness(_) => Some(json!({ "owner": ADMIN_OWNER })),
            Self::UnassignBusiness(_) => Some(json!({ "owner": null })),
            _ => None,
        };
        let payload = transport.request(method, &path, body).await?;
        debug!("{} {} on {kind} succeeded", self.name(), self.target());

        let id = self.target().clone();
        Ok(match self {
            Self::Delete(_) | Self::DismissReport(_) => LocalMutation::Remove(id),
            Self::Update(_, fields) => match payload.record() {
                Some(record) if record.id() == &id => LocalMutation::Upsert(record),
                _ => LocalMutation::Patch(id, fields.clone()),
            },
            Self::BanUser(_) => LocalMutation::status(id, "banned"),
            Self::UnbanUser(_) => LocalMutation::status(id, "active"),
            Self::ApprovePost(_) => LocalMutation::status(id, "published"),
            Self::FlagPost(_) => LocalMutation::status(id, "flagged"),
            Self::ResolveReport(_) => LocalMutation::ResolveReport(id),
            Self::ApproveVerification(_) => LocalMutation::status(id, "approved"),
            Self::RejectVerification(_) => LocalMutation::status(id, "rejected"),
            Self::VerifyBusiness(_) => LocalMutation::field(id, "verified", Value::Bool(true)),
            Self::AssignBusiness(_) => LocalMutation::field(id, "owner", json!(ADMIN_OWNER)),
            Self::UnassignBusiness(_) => LocalMutation::field(id, "owner", Value::Null),
        })
    }
}
