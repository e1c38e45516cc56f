use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::bundle::GraphBundle;
use crate::error::BundleError;
use crate::service::BundleService;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImplementationChange {
  pub from: String,
  pub to: String,
}

/// What reconciling a bundle against the registry changes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePreview {
  /// Missing agent types the registry now declares.
  pub resolved: BTreeSet<String>,
  /// Mapped agent types whose implementation moved.
  pub updated: BTreeMap<String, ImplementationChange>,
  /// Agent types that lost their declaration.
  pub demoted: BTreeSet<String>,
  /// Missing agent types that remain missing.
  pub still_missing: BTreeSet<String>,
  pub services_added: BTreeSet<String>,
  pub services_removed: BTreeSet<String>,
  pub load_order_changed: bool,
}

impl UpdatePreview {
  pub fn has_changes(&self) -> bool {
    !self.resolved.is_empty()
      || !self.updated.is_empty()
      || !self.demoted.is_empty()
      || !self.services_added.is_empty()
      || !self.services_removed.is_empty()
      || self.load_order_changed
  }
}

/// Result of [`BundleUpdateService::reconcile`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateOutcome {
  pub changes: UpdatePreview,
  /// Whether any bundle field changed.
  pub changed: bool,
  /// Whether the updated bundle was written to the store.
  pub saved: bool,
  /// Why saving failed, if it did. The in-memory update still stands.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub save_error: Option<String>,
}

/// The bundle fields reconciliation recomputes.
struct Plan {
  agent_mappings: BTreeMap<String, String>,
  custom_agents: BTreeSet<String>,
  missing_declarations: BTreeSet<String>,
  required_services: BTreeSet<String>,
  service_load_order: Vec<String>,
  protocols: BTreeSet<String>,
  preview: UpdatePreview,
}

impl Plan {
  fn differs_from(&self, bundle: &GraphBundle) -> bool {
    self.agent_mappings != bundle.agent_mappings
      || self.custom_agents != bundle.custom_agents
      || self.missing_declarations != bundle.missing_declarations
      || self.required_services != bundle.required_services
      || self.service_load_order != bundle.service_load_order
      || self.protocols != bundle.protocols
  }

  fn apply(self, bundle: &mut GraphBundle) -> UpdatePreview {
    bundle.agent_mappings = self.agent_mappings;
    bundle.custom_agents = self.custom_agents;
    bundle.missing_declarations = self.missing_declarations;
    bundle.required_services = self.required_services;
    bundle.service_load_order = self.service_load_order;
    bundle.protocols = self.protocols;
    self.preview
  }
}

/// Repairs stored bundles against the live declaration registry.
pub struct BundleUpdateService {
  bundles: BundleService,
}

impl BundleUpdateService {
  pub fn new(bundles: BundleService) -> Self {
    Self { bundles }
  }

  fn plan(&self, bundle: &GraphBundle) -> Result<Plan, BundleError> {
    let registry = self.bundles.registry();
    let mut preview = UpdatePreview::default();
    let mut agent_mappings = bundle.agent_mappings.clone();
    let mut custom_agents = bundle.custom_agents.clone();
    let mut missing_declarations = bundle.missing_declarations.clone();

    for agent_type in &bundle.missing_declarations {
      match registry.get_agent_declaration(agent_type) {
        Some(declaration) => {
          missing_declarations.remove(agent_type);
          if declaration.is_custom() {
            agent_mappings.insert(agent_type.clone(), declaration.implementation);
            custom_agents.insert(agent_type.clone());
          }
          preview.resolved.insert(agent_type.clone());
        }
        None => {
          preview.still_missing.insert(agent_type.clone());
        }
      }
    }

    for (agent_type, implementation) in &bundle.agent_mappings {
      match registry.get_agent_declaration(agent_type) {
        Some(declaration) if declaration.implementation != *implementation => {
          agent_mappings.insert(agent_type.clone(), declaration.implementation.clone());
          preview.updated.insert(
            agent_type.clone(),
            ImplementationChange {
              from: implementation.clone(),
              to: declaration.implementation,
            },
          );
        }
        Some(_) => {}
        None => {
          agent_mappings.remove(agent_type);
          custom_agents.remove(agent_type);
          missing_declarations.insert(agent_type.clone());
          preview.demoted.insert(agent_type.clone());
        }
      }
    }

    // Built-in agents are not mapped, but they can disappear too.
    for agent_type in &bundle.required_agents {
      if !bundle.agent_mappings.contains_key(agent_type)
        && !bundle.missing_declarations.contains(agent_type)
        && registry.get_agent_declaration(agent_type).is_none()
      {
        missing_declarations.insert(agent_type.clone());
        preview.demoted.insert(agent_type.clone());
      }
    }

    let requirements = registry.resolve_requirements(&bundle.required_agents);
    let required_services = self.bundles.filter_actual_services(&requirements.services);
    let service_load_order = registry.calculate_load_order(&required_services)?;

    preview.services_added = required_services
      .difference(&bundle.required_services)
      .cloned()
      .collect();
    preview.services_removed = bundle
      .required_services
      .difference(&required_services)
      .cloned()
      .collect();
    preview.load_order_changed = service_load_order != bundle.service_load_order;

    Ok(Plan {
      agent_mappings,
      custom_agents,
      missing_declarations,
      required_services,
      service_load_order,
      protocols: requirements.protocols,
      preview,
    })
  }

  /// Bring a bundle in line with the registry.
  ///
  /// `last_updated` is only touched when a field changes, and the bundle is
  /// only saved when `persist` is set and something changed. A failed save
  /// is reported in the outcome and leaves the in-memory update in place.
  #[instrument(name = "reconcile_bundle", skip(self, bundle), fields(graph = %bundle.graph_name))]
  pub async fn reconcile(
    &self,
    bundle: &mut GraphBundle,
    persist: bool,
  ) -> Result<UpdateOutcome, BundleError> {
    let plan = self.plan(bundle)?;

    if !plan.differs_from(bundle) {
      debug!("bundle is up to date");
      return Ok(UpdateOutcome {
        changes: plan.preview,
        ..UpdateOutcome::default()
      });
    }

    let changes = plan.apply(bundle);
    bundle.last_updated = Some(Utc::now());

    info!(
      resolved = changes.resolved.len(),
      updated = changes.updated.len(),
      demoted = changes.demoted.len(),
      services = bundle.required_services.len(),
      "bundle reconciled"
    );
    for agent_type in &changes.demoted {
      warn!(agent_type = %agent_type, "agent declaration no longer available");
    }

    let mut outcome = UpdateOutcome {
      changes,
      changed: true,
      saved: false,
      save_error: None,
    };

    if persist {
      match self.bundles.save_bundle(bundle).await {
        Ok(_) => outcome.saved = true,
        Err(e) => {
          warn!(error = %e, "failed to save reconciled bundle");
          outcome.save_error = Some(e.to_string());
        }
      }
    }

    Ok(outcome)
  }

  /// Report what [`reconcile`](Self::reconcile) would change, without
  /// changing anything.
  pub fn get_update_summary(&self, bundle: &GraphBundle) -> Result<UpdatePreview, BundleError> {
    Ok(self.plan(bundle)?.preview)
  }
}
