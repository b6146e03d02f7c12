//! Host-facing lifecycle driver.
//!
//! Every entry point takes a resource kind name and returns the new state
//! (or `None` when the resource no longer exists) together with diagnostics.
//! Errors never escape as `Err`: they are turned into error diagnostics whose
//! summary names the kind and the operation.

use std::collections::BTreeMap;
use std::sync::Arc;

use octofhir_client::Session;
use tracing::Instrument;

use crate::attr::AttrMap;
use crate::data::ResourceData;
use crate::error::{Diagnostic, Diagnostics, ProviderError, Result};
use crate::lifecycle::{OpContext, Resource};
use crate::migrate::{self, PersistedState};
use crate::resources;
use crate::schema::Plan;

pub type Outcome = (Option<PersistedState>, Diagnostics);

/// Registry of resource kinds bound to one session.
pub struct Provider {
    session: Arc<Session>,
    resources: BTreeMap<&'static str, Arc<dyn Resource>>,
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("kinds", &self.resources.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Provider {
    /// Provider with every built-in resource kind registered.
    pub fn new(session: Arc<Session>) -> Self {
        let mut provider = Self::empty(session);
        for resource in resources::all() {
            provider.register(resource);
        }
        provider
    }

    pub fn empty(session: Arc<Session>) -> Self {
        Self {
            session,
            resources: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, resource: Arc<dyn Resource>) {
        self.resources.insert(resource.kind(), resource);
    }

    pub fn kinds(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.resources.keys().copied()
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Fresh operation context with default timeouts and no cancellation.
    pub fn context(&self) -> OpContext {
        OpContext::new(Arc::clone(&self.session))
    }

    fn resource(&self, kind: &str) -> Result<&Arc<dyn Resource>> {
        self.resources
            .get(kind)
            .ok_or_else(|| ProviderError::Unsupported(format!("unknown resource kind '{kind}'")))
    }

    /// Schema and resource-specific validation of a configuration.
    pub fn validate(&self, kind: &str, config: &AttrMap) -> Diagnostics {
        match self.resource(kind) {
            Ok(resource) => validate_with(resource.as_ref(), config),
            Err(err) => failure(kind, "validate", &err),
        }
    }

    /// Changes the host would apply to move `prior` to `config`.
    pub fn plan(
        &self,
        kind: &str,
        prior: Option<&PersistedState>,
        config: &AttrMap,
    ) -> (Option<Plan>, Diagnostics) {
        self.plan_inner(kind, prior, config)
            .unwrap_or_else(|err| (None, failure(kind, "plan", &err)))
    }

    fn plan_inner(
        &self,
        kind: &str,
        prior: Option<&PersistedState>,
        config: &AttrMap,
    ) -> Result<(Option<Plan>, Diagnostics)> {
        let resource = self.resource(kind)?;
        let mut diags = validate_with(resource.as_ref(), config);
        if diags.has_errors() {
            return Ok((None, diags));
        }
        let schema = resource.schema();
        let mut planned = config.clone();
        schema.apply_defaults(&mut planned);
        let prior_attrs = match prior {
            Some(state) => Some(self.decode(resource.as_ref(), state)?),
            None => None,
        };
        let plan = schema.plan(prior_attrs.as_ref(), &planned);
        if plan.requires_replace() {
            diags.warning(
                format!("{kind}: change requires replacement"),
                plan.replace.join(", "),
            );
        }
        Ok((Some(plan), diags))
    }

    pub async fn create(&self, ctx: &OpContext, kind: &str, config: AttrMap) -> Outcome {
        let span = tracing::info_span!("create", kind);
        async {
            let resource = match self.resource(kind) {
                Ok(r) => Arc::clone(r),
                Err(err) => return (None, failure(kind, "create", &err)),
            };
            let mut diags = validate_with(resource.as_ref(), &config);
            if diags.has_errors() {
                return (None, diags);
            }
            let schema = resource.schema();
            let mut planned = config;
            schema.apply_defaults(&mut planned);
            let mut data = ResourceData::for_create(planned);

            if let Err(err) = resource.create(ctx, &mut data).await {
                diags.extend(data.take_warnings());
                diags.push(Diagnostic::from_error(kind, "create", &err));
                // keep whatever got created so the host can clean it up
                return (data.to_state(schema), diags);
            }
            tracing::info!(id = data.id_or_empty(), "created");
            if let Err(err) = resource.read(ctx, &mut data).await {
                diags.extend(data.take_warnings());
                diags.push(Diagnostic::from_error(kind, "read after create", &err));
                return (data.to_state(schema), diags);
            }
            diags.extend(data.take_warnings());
            if data.id().is_none() {
                diags.push(Diagnostic::error(format!(
                    "{kind}: resource disappeared right after create"
                )));
            }
            (data.to_state(schema), diags)
        }
        .instrument(span)
        .await
    }

    pub async fn read(&self, ctx: &OpContext, kind: &str, state: PersistedState) -> Outcome {
        let span = tracing::info_span!("read", kind, id = %state.id);
        async {
            let (resource, prior) = match self.prepare(kind, &state) {
                Ok(v) => v,
                Err(err) => {
                    return (Some(state), failure(kind, "read", &err));
                }
            };
            let mut data = ResourceData::from_state(state.id.clone(), prior);
            let mut diags = Diagnostics::new();
            if let Err(err) = resource.read(ctx, &mut data).await {
                diags.extend(data.take_warnings());
                diags.push(Diagnostic::from_error(kind, "read", &err));
                return (Some(state), diags);
            }
            diags.extend(data.take_warnings());
            if data.id().is_none() {
                tracing::info!("resource removed outside of the provider");
            }
            (data.to_state(resource.schema()), diags)
        }
        .instrument(span)
        .await
    }

    pub async fn update(
        &self,
        ctx: &OpContext,
        kind: &str,
        state: PersistedState,
        config: AttrMap,
    ) -> Outcome {
        let span = tracing::info_span!("update", kind, id = %state.id);
        async {
            let (resource, prior) = match self.prepare(kind, &state) {
                Ok(v) => v,
                Err(err) => {
                    return (Some(state), failure(kind, "update", &err));
                }
            };
            let mut diags = validate_with(resource.as_ref(), &config);
            if diags.has_errors() {
                return (Some(state), diags);
            }
            let schema = resource.schema();
            let mut planned = config;
            schema.apply_defaults(&mut planned);
            let plan = schema.plan(Some(&prior), &planned);
            if plan.requires_replace() {
                for attr in &plan.replace {
                    diags.push(
                        Diagnostic::error(format!("{kind}: {attr} cannot be changed in place"))
                            .with_attribute(attr.clone()),
                    );
                }
                return (Some(state), diags);
            }
            schema.merge_computed(&prior, &mut planned);
            let mut data =
                ResourceData::for_update(state.id.clone(), prior, planned).with_schema(schema);

            if let Err(err) = resource.update(ctx, &mut data).await {
                diags.extend(data.take_warnings());
                diags.push(Diagnostic::from_error(kind, "update", &err));
                // keep whatever the server already confirmed
                let state = data.partial_state(schema).unwrap_or(state);
                return (Some(state), diags);
            }
            if let Err(err) = resource.read(ctx, &mut data).await {
                diags.extend(data.take_warnings());
                diags.push(Diagnostic::from_error(kind, "read after update", &err));
                return (data.to_state(schema), diags);
            }
            diags.extend(data.take_warnings());
            (data.to_state(schema), diags)
        }
        .instrument(span)
        .await
    }

    /// Delete; `None` state on success.
    pub async fn delete(&self, ctx: &OpContext, kind: &str, state: PersistedState) -> Outcome {
        let span = tracing::info_span!("delete", kind, id = %state.id);
        async {
            let (resource, prior) = match self.prepare(kind, &state) {
                Ok(v) => v,
                Err(err) => {
                    return (Some(state), failure(kind, "delete", &err));
                }
            };
            let mut data = ResourceData::from_state(state.id.clone(), prior);
            let mut diags = Diagnostics::new();
            if let Err(err) = resource.delete(ctx, &mut data).await {
                diags.extend(data.take_warnings());
                diags.push(Diagnostic::from_error(kind, "delete", &err));
                return (Some(state), diags);
            }
            diags.extend(data.take_warnings());
            tracing::info!("deleted");
            (None, diags)
        }
        .instrument(span)
        .await
    }

    /// Resolve an import identifier, then read the resource.
    pub async fn import(&self, ctx: &OpContext, kind: &str, import_id: &str) -> Outcome {
        let span = tracing::info_span!("import", kind, import_id);
        async {
            let resource = match self.resource(kind) {
                Ok(r) => Arc::clone(r),
                Err(err) => return (None, failure(kind, "import", &err)),
            };
            let mut data = ResourceData::for_create(AttrMap::new());
            let mut diags = Diagnostics::new();
            if let Err(err) = resource.import(ctx, import_id, &mut data).await {
                diags.push(Diagnostic::from_error(kind, "import", &err));
                return (None, diags);
            }
            let id = data.id_or_empty().to_string();
            let schema = resource.schema();
            let mut attrs = data.attributes().clone();
            schema.apply_defaults(&mut attrs);
            let mut data = ResourceData::from_state(id, attrs);
            if let Err(err) = resource.read(ctx, &mut data).await {
                diags.push(Diagnostic::from_error(kind, "import", &err));
                return (None, diags);
            }
            diags.extend(data.take_warnings());
            if data.id().is_none() {
                diags.push(Diagnostic::error(format!(
                    "{kind}: cannot import non-existent remote object '{import_id}'"
                )));
            }
            (data.to_state(schema), diags)
        }
        .instrument(span)
        .await
    }

    /// Upgrade persisted state to the kind's current schema version.
    pub fn upgrade_state(&self, kind: &str, state: PersistedState) -> Outcome {
        let result = self.resource(kind).and_then(|resource| {
            migrate::upgrade(state.clone(), resource.schema().version, resource.upgraders())
        });
        match result {
            Ok(upgraded) => (Some(upgraded), Diagnostics::new()),
            Err(err) => (
                Some(state),
                failure(kind, "upgrade state", &err),
            ),
        }
    }

    fn prepare(&self, kind: &str, state: &PersistedState) -> Result<(Arc<dyn Resource>, AttrMap)> {
        let resource = Arc::clone(self.resource(kind)?);
        let prior = self.decode(resource.as_ref(), state)?;
        Ok((resource, prior))
    }

    /// Upgrade if needed, then decode attributes.
    fn decode(&self, resource: &dyn Resource, state: &PersistedState) -> Result<AttrMap> {
        let schema = resource.schema();
        if state.schema_version < schema.version {
            let upgraded = migrate::upgrade(state.clone(), schema.version, resource.upgraders())?;
            return schema.decode_state(&upgraded.attributes);
        }
        schema.decode_state(&state.attributes)
    }
}

fn failure(kind: &str, operation: &str, err: &ProviderError) -> Diagnostics {
    Diagnostic::from_error(kind, operation, err).into()
}

fn validate_with(resource: &dyn Resource, config: &AttrMap) -> Diagnostics {
    let mut diags = resource.schema().validate_config(config);
    if !diags.has_errors() {
        diags.extend(resource.validate(config));
    }
    diags
}
