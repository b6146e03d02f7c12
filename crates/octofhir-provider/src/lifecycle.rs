//! Resource contract and the helpers shared by every CRUD implementation.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use octofhir_client::{CallError, Orchestrator, Realm, RestClient, Session};
use octofhir_config::Service;
use tokio_util::sync::CancellationToken;

use crate::attr::AttrMap;
use crate::data::ResourceData;
use crate::error::{Diagnostics, ProviderError, Result};
use crate::migrate::StateUpgrader;
use crate::schema::Schema;
use crate::wait::POLL_INTERVAL;

/// Host-supplied deadlines per CRUD step.
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub create: Duration,
    pub read: Duration,
    pub update: Duration,
    pub delete: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            create: Duration::from_secs(20 * 60),
            read: Duration::from_secs(5 * 60),
            update: Duration::from_secs(20 * 60),
            delete: Duration::from_secs(20 * 60),
        }
    }
}

/// Everything one CRUD step needs: the shared session, the host's
/// cancellation signal and its deadlines.
#[derive(Clone)]
pub struct OpContext {
    pub session: Arc<Session>,
    pub cancel: CancellationToken,
    pub timeouts: Timeouts,
    /// Interval between status polls of asynchronous operations
    pub poll_interval: Duration,
}

impl std::fmt::Debug for OpContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpContext")
            .field("cancelled", &self.cancel.is_cancelled())
            .field("timeouts", &self.timeouts)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

impl OpContext {
    pub fn new(session: Arc<Session>) -> Self {
        Self {
            session,
            cancel: CancellationToken::new(),
            timeouts: Timeouts::default(),
            poll_interval: POLL_INTERVAL,
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn rest(&self, service: Service) -> RestClient {
        RestClient::new(Arc::clone(&self.session), service)
    }

    pub fn orchestrator(&self, realm: Realm) -> Orchestrator {
        self.session.orchestrator(realm)
    }

    /// Run `op` under the orchestrator with the configured attempt budget.
    pub async fn call<T, F, Fut>(
        &self,
        realm: Realm,
        retry_on: &[u16],
        op: F,
    ) -> std::result::Result<T, CallError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, CallError>>,
    {
        self.orchestrator(realm)
            .execute(&self.cancel, 0, retry_on, op)
            .await
    }

    /// Like [`OpContext::call`] with an explicit attempt budget.
    pub async fn call_with<T, F, Fut>(
        &self,
        realm: Realm,
        max_attempts: u32,
        retry_on: &[u16],
        op: F,
    ) -> std::result::Result<T, CallError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, CallError>>,
    {
        self.orchestrator(realm)
            .execute(&self.cancel, max_attempts, retry_on, op)
            .await
    }
}

/// One managed resource kind.
///
/// Implementations translate between [`ResourceData`] and service calls.
/// The engine handles validation, defaults, planning, state encoding and
/// diagnostics around them.
#[async_trait]
pub trait Resource: Send + Sync {
    /// Kind name as used by the host, e.g. `iam_group`.
    fn kind(&self) -> &'static str;

    fn schema(&self) -> &Schema;

    /// Cross-field checks beyond what the schema expresses.
    fn validate(&self, _config: &AttrMap) -> Diagnostics {
        Diagnostics::new()
    }

    /// Upgraders from each older schema version.
    fn upgraders(&self) -> &[StateUpgrader] {
        &[]
    }

    async fn create(&self, ctx: &OpContext, data: &mut ResourceData) -> Result<()>;

    /// Refresh `data` from the server; clear the ID when the resource is gone.
    async fn read(&self, ctx: &OpContext, data: &mut ResourceData) -> Result<()>;

    async fn update(&self, ctx: &OpContext, data: &mut ResourceData) -> Result<()>;

    async fn delete(&self, ctx: &OpContext, data: &mut ResourceData) -> Result<()>;

    /// Turn an import identifier into an ID and whatever attributes it
    /// carries. The default passes the identifier through.
    async fn import(&self, _ctx: &OpContext, id: &str, data: &mut ResourceData) -> Result<()> {
        data.set_id(id);
        Ok(())
    }
}

/// Result of [`create_or_adopt`].
#[derive(Debug, Clone, PartialEq)]
pub enum Created<T> {
    New(T),
    /// A matching resource already existed and was taken over
    Adopted(T),
}

impl<T> Created<T> {
    pub fn into_inner(self) -> T {
        match self {
            Created::New(v) | Created::Adopted(v) => v,
        }
    }

    pub fn is_adopted(&self) -> bool {
        matches!(self, Created::Adopted(_))
    }
}

/// Create, and on `409 Conflict` adopt the existing resource found by
/// `lookup` if `matches` accepts it.
///
/// Success means either a new resource or an existing one whose
/// identity-critical fields match; a mismatch is a
/// [`ProviderError::FieldMismatch`].
pub async fn create_or_adopt<T, C, L, LF, M>(
    operation: &str,
    create: C,
    lookup: L,
    matches: M,
) -> Result<Created<T>>
where
    C: Future<Output = std::result::Result<T, CallError>>,
    L: FnOnce() -> LF,
    LF: Future<Output = std::result::Result<Option<T>, CallError>>,
    M: FnOnce(&T) -> Result<()>,
{
    let conflict = match create.await {
        Ok(created) => return Ok(Created::New(created)),
        Err(err) if err.is_conflict() => err,
        Err(err) => return Err(ProviderError::client(operation, err)),
    };
    tracing::info!(operation, "create conflicted, looking for an existing resource to adopt");
    let existing = lookup()
        .await
        .map_err(|e| ProviderError::client(format!("{operation}: lookup after conflict"), e))?;
    match existing {
        Some(existing) => {
            matches(&existing)?;
            Ok(Created::Adopted(existing))
        }
        None => Err(ProviderError::client(operation, conflict)),
    }
}

/// Compare an identity-critical field of an adoption candidate.
pub fn ensure_field(field: &str, expected: &str, actual: &str, case_insensitive: bool) -> Result<()> {
    let same = if case_insensitive {
        expected.eq_ignore_ascii_case(actual)
    } else {
        expected == actual
    };
    if same {
        Ok(())
    } else {
        Err(ProviderError::mismatch(field, expected, actual))
    }
}

/// 404 or 410.
pub fn gone(err: &CallError) -> bool {
    err.is_gone()
}

/// Map "already gone" to `None`.
pub fn tolerate_gone<T>(
    result: std::result::Result<T, CallError>,
) -> std::result::Result<Option<T>, CallError> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(err) if gone(&err) => Ok(None),
        Err(err) => Err(err),
    }
}

/// Read helper: clear the ID on 404/410 and report whether the resource exists.
pub fn found<T>(
    data: &mut ResourceData,
    operation: &str,
    result: std::result::Result<T, CallError>,
) -> Result<Option<T>> {
    match tolerate_gone(result) {
        Ok(Some(v)) => Ok(Some(v)),
        Ok(None) => {
            tracing::info!(operation, id = data.id_or_empty(), "resource gone, clearing ID");
            data.clear_id();
            Ok(None)
        }
        Err(err) => Err(ProviderError::client(operation, err)),
    }
}

/// ID of `data` or a validation error.
pub fn require_id(data: &ResourceData) -> Result<String> {
    data.id()
        .map(str::to_string)
        .ok_or_else(|| ProviderError::validation("id", "resource has no ID"))
}
