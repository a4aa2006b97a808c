//! Variant lifecycle and the creation saga.
//!
//! Creating a variant is several store writes (the variant row, then one
//! assignment per selected option) with no transaction spanning them. The
//! saga makes the intermediate states explicit:
//!
//! ```text
//! Started ──► VariantInserted ──► AssignmentsApplied{n} ──► Completed
//!    │              │                     │
//!    └──────────────┴─────────────────────┴──► Compensated | CompensationFailed
//! ```
//!
//! Compensation archives the variant and removes its assignment rows. It is
//! attempted once, under a context detached from the caller's cancel signal,
//! and never replaces the error that triggered it.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use storefront_catalog::rules;
use storefront_catalog::{
    NewVariant, Selection, Variant, VariantOptionAssignment, VariantPatch, VariantWithAssignments,
};
use storefront_core::{CatalogError, CatalogResult, ErrorKind, ProductId, TenantId, VariantId};

use super::CatalogEngine;
use crate::catalog_store::CatalogStore;
use crate::context::CallContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum CreationStep {
    Started,
    VariantInserted,
    AssignmentsApplied { count: usize },
    Completed,
    Compensated,
    CompensationFailed,
}

impl CreationStep {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CreationStep::Completed | CreationStep::Compensated | CreationStep::CompensationFailed
        )
    }

    fn can_advance_to(&self, next: &CreationStep) -> bool {
        use CreationStep::*;
        match (self, next) {
            (Started, VariantInserted) => true,
            (VariantInserted, AssignmentsApplied { count }) => *count == 1,
            (AssignmentsApplied { count: a }, AssignmentsApplied { count: b }) => *b == *a + 1,
            (VariantInserted | AssignmentsApplied { .. }, Completed) => true,
            (Started | VariantInserted | AssignmentsApplied { .. }, Compensated | CompensationFailed) => true,
            _ => false,
        }
    }
}

/// Progress record of one variant creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreationSaga {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub variant_id: VariantId,
    step: CreationStep,
    history: Vec<CreationStep>,
}

impl CreationSaga {
    pub fn new(tenant_id: TenantId, product_id: ProductId, variant_id: VariantId) -> Self {
        Self {
            tenant_id,
            product_id,
            variant_id,
            step: CreationStep::Started,
            history: vec![CreationStep::Started],
        }
    }

    pub fn step(&self) -> CreationStep {
        self.step
    }

    pub fn history(&self) -> &[CreationStep] {
        &self.history
    }

    /// Move to `next`. Illegal transitions are logged and ignored.
    pub fn advance(&mut self, next: CreationStep) {
        if !self.step.can_advance_to(&next) {
            warn!(
                variant_id = %self.variant_id,
                from = ?self.step,
                to = ?next,
                "ignoring illegal creation saga transition"
            );
            return;
        }
        debug!(variant_id = %self.variant_id, from = ?self.step, to = ?next, "creation saga advanced");
        self.step = next;
        self.history.push(next);
    }
}

impl<S: CatalogStore> CatalogEngine<S> {
    /// Create a variant and bind it to `input.selection`.
    ///
    /// On any failure after the variant row exists, the variant is archived
    /// and stripped of assignments before the original error is returned.
    #[instrument(
        skip(self, ctx, input),
        fields(tenant_id = %ctx.tenant_id(), product_id = %product_id, selection_len = input.selection.len()),
        err
    )]
    pub async fn create_variant(
        &self,
        ctx: &CallContext,
        product_id: ProductId,
        input: NewVariant,
    ) -> CatalogResult<VariantWithAssignments> {
        self.run_creation(ctx, product_id, input).await.0
    }

    /// [`create_variant`](Self::create_variant), also returning the saga record.
    pub async fn run_creation(
        &self,
        ctx: &CallContext,
        product_id: ProductId,
        input: NewVariant,
    ) -> (CatalogResult<VariantWithAssignments>, CreationSaga) {
        let variant_id = VariantId::new();
        let mut saga = CreationSaga::new(ctx.tenant_id(), product_id, variant_id);
        let result = self.create_steps(ctx, &mut saga, input).await;
        (result, saga)
    }

    async fn create_steps(
        &self,
        ctx: &CallContext,
        saga: &mut CreationSaga,
        input: NewVariant,
    ) -> CatalogResult<VariantWithAssignments> {
        let variant = Variant::create(saga.variant_id, saga.product_id, &input, Utc::now())?;
        self.require_product(ctx, saga.product_id).await?;

        let siblings = ctx
            .run("list_variants", self.store.list_variants(ctx.tenant_id(), saga.product_id))
            .await?;
        rules::ensure_unique_variant_name(&variant.name, &siblings, None)?;

        let variant = match ctx
            .run("insert_variant", self.store.insert_variant(ctx.tenant_id(), variant))
            .await
        {
            Ok(v) => v,
            Err(err) if err.kind() == ErrorKind::Cancelled => {
                // The insert may have committed before the race was lost.
                self.compensate(ctx, saga, &err).await;
                return Err(err);
            }
            Err(err) => return Err(err),
        };
        saga.advance(CreationStep::VariantInserted);

        match self.apply_selection(ctx, saga, &variant, &input.selection).await {
            Ok(assignments) => {
                saga.advance(CreationStep::Completed);
                info!(
                    variant_id = %variant.id,
                    name = %variant.name,
                    assignments = assignments.len(),
                    "variant created"
                );
                Ok(VariantWithAssignments {
                    variant,
                    assignments,
                })
            }
            Err(err) => {
                self.compensate(ctx, saga, &err).await;
                Err(err)
            }
        }
    }

    async fn apply_selection(
        &self,
        ctx: &CallContext,
        saga: &mut CreationSaga,
        variant: &Variant,
        selection: &Selection,
    ) -> CatalogResult<Vec<VariantOptionAssignment>> {
        let mut applied = Vec::with_capacity(selection.len());
        for entry in selection.iter() {
            self.require_value(ctx, entry.option_value_id).await?;
            let assignment = VariantOptionAssignment::new(variant.id, *entry);
            let assignment = ctx
                .run("insert_assignment", self.store.insert_assignment(ctx.tenant_id(), assignment))
                .await?;
            applied.push(assignment);
            saga.advance(CreationStep::AssignmentsApplied {
                count: applied.len(),
            });
        }

        let option_count = ctx
            .run("count_options", self.store.count_options(ctx.tenant_id(), variant.product_id))
            .await?;
        rules::ensure_complete(applied.len(), option_count as usize)?;
        Ok(applied)
    }

    async fn compensate(&self, ctx: &CallContext, saga: &mut CreationSaga, cause: &CatalogError) {
        warn!(
            variant_id = %saga.variant_id,
            step = ?saga.step(),
            error = %cause,
            "variant creation failed, compensating"
        );

        let cleanup = ctx.detached(self.config.compensation_timeout);
        let result = cleanup
            .run(
                "discard_variant",
                self.store
                    .discard_variant(ctx.tenant_id(), saga.variant_id, Utc::now()),
            )
            .await;

        match result {
            Ok(()) => {
                saga.advance(CreationStep::Compensated);
                info!(variant_id = %saga.variant_id, "variant archived after failed creation");
            }
            // Nothing was written, so there is nothing to undo.
            Err(err) if err.kind() == ErrorKind::NotFound => {
                saga.advance(CreationStep::Compensated);
            }
            Err(err) => {
                saga.advance(CreationStep::CompensationFailed);
                error!(
                    variant_id = %saga.variant_id,
                    error = %err,
                    original_error = %cause,
                    "compensation failed; variant may be left partially configured"
                );
            }
        }
    }

    /// Partial update of scalar fields. Only the `Some` fields of `patch` are
    /// written, so concurrent patches of different fields both land.
    /// Assignments are never touched.
    #[instrument(skip(self, ctx, patch), fields(tenant_id = %ctx.tenant_id(), variant_id = %id), err)]
    pub async fn update_variant(
        &self,
        ctx: &CallContext,
        id: VariantId,
        patch: VariantPatch,
    ) -> CatalogResult<VariantWithAssignments> {
        let mut preview = self.require_variant(ctx, id).await?;
        preview.apply(&patch)?;

        if patch.name.is_some() {
            let siblings = ctx
                .run("list_variants", self.store.list_variants(ctx.tenant_id(), preview.product_id))
                .await?;
            rules::ensure_unique_variant_name(&preview.name, &siblings, Some(id))?;
        }

        let variant = ctx
            .run("update_variant", self.store.update_variant(ctx.tenant_id(), id, patch))
            .await?;
        let assignments = ctx
            .run("list_assignments", self.store.list_assignments(ctx.tenant_id(), id))
            .await?;
        info!(variant_id = %id, "variant updated");
        Ok(VariantWithAssignments {
            variant,
            assignments,
        })
    }

    /// One-way transition to archived; `ALREADY_ARCHIVED` on a second call.
    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id(), variant_id = %id), err)]
    pub async fn archive_variant(&self, ctx: &CallContext, id: VariantId) -> CatalogResult<VariantWithAssignments> {
        let variant = ctx
            .run("archive_variant", self.store.archive_variant(ctx.tenant_id(), id, Utc::now()))
            .await?;
        let assignments = ctx
            .run("list_assignments", self.store.list_assignments(ctx.tenant_id(), id))
            .await?;
        info!(variant_id = %id, "variant archived");
        Ok(VariantWithAssignments {
            variant,
            assignments,
        })
    }

    pub async fn get_variant(&self, ctx: &CallContext, id: VariantId) -> CatalogResult<VariantWithAssignments> {
        let variant = self.require_variant(ctx, id).await?;
        let assignments = ctx
            .run("list_assignments", self.store.list_assignments(ctx.tenant_id(), id))
            .await?;
        Ok(VariantWithAssignments {
            variant,
            assignments,
        })
    }

    /// Variants in creation order. `active_only` keeps those that are both
    /// non-archived and flagged active.
    pub async fn get_variants_by_product(
        &self,
        ctx: &CallContext,
        product_id: ProductId,
        active_only: bool,
    ) -> CatalogResult<Vec<Variant>> {
        self.require_product(ctx, product_id).await?;
        let variants = ctx
            .run("list_variants", self.store.list_variants(ctx.tenant_id(), product_id))
            .await?;
        Ok(if active_only {
            variants.into_iter().filter(|v| v.is_purchasable()).collect()
        } else {
            variants
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use storefront_catalog::NewProduct;
    use storefront_core::{ErrorCode, OptionId, OptionValueId};

    use crate::catalog_store::{FaultPlan, InMemoryCatalogStore};
    use crate::config::EngineConfig;

    use super::*;

    struct Coffee {
        engine: CatalogEngine<InMemoryCatalogStore>,
        ctx: CallContext,
        product: ProductId,
        size: OptionId,
        grind: OptionId,
        oz12: OptionValueId,
        lb5: OptionValueId,
        whole: OptionValueId,
    }

    async fn coffee() -> Coffee {
        let engine = CatalogEngine::new(InMemoryCatalogStore::new(), EngineConfig::default());
        let ctx = engine.context(TenantId::new());
        let product = engine.create_product(&ctx, NewProduct::new("Coffee A")).await.unwrap().id;
        let size = engine.create_option(&ctx, product, "size").await.unwrap().option.id;
        let grind = engine.create_option(&ctx, product, "grind").await.unwrap().option.id;
        let oz12 = engine.create_value(&ctx, size, "12oz").await.unwrap().id;
        let lb5 = engine.create_value(&ctx, size, "5lb").await.unwrap().id;
        let whole = engine.create_value(&ctx, grind, "whole").await.unwrap().id;
        Coffee {
            engine,
            ctx,
            product,
            size,
            grind,
            oz12,
            lb5,
            whole,
        }
    }

    #[test]
    fn saga_rejects_illegal_transitions() {
        let mut saga = CreationSaga::new(TenantId::new(), ProductId::new(), VariantId::new());
        saga.advance(CreationStep::Completed);
        assert_eq!(saga.step(), CreationStep::Started);

        saga.advance(CreationStep::VariantInserted);
        saga.advance(CreationStep::AssignmentsApplied { count: 2 });
        assert_eq!(saga.step(), CreationStep::VariantInserted);

        saga.advance(CreationStep::AssignmentsApplied { count: 1 });
        saga.advance(CreationStep::Compensated);
        assert!(saga.step().is_terminal());
        saga.advance(CreationStep::Completed);
        assert_eq!(saga.step(), CreationStep::Compensated);
    }

    #[tokio::test]
    async fn complete_selection_completes_the_saga() {
        let c = coffee().await;
        let input = NewVariant::new("12oz whole", 1800, 3)
            .with_selection(Selection::new().with(c.size, c.oz12).with(c.grind, c.whole));
        let (result, saga) = c.engine.run_creation(&c.ctx, c.product, input).await;

        let created = result.unwrap();
        assert_eq!(created.assignments.len(), 2);
        assert_eq!(
            saga.history(),
            &[
                CreationStep::Started,
                CreationStep::VariantInserted,
                CreationStep::AssignmentsApplied { count: 1 },
                CreationStep::AssignmentsApplied { count: 2 },
                CreationStep::Completed,
            ]
        );
    }

    #[tokio::test]
    async fn incomplete_selection_is_compensated() {
        let c = coffee().await;
        let input =
            NewVariant::new("12oz", 1800, 3).with_selection(Selection::new().with(c.size, c.oz12));
        let (result, saga) = c.engine.run_creation(&c.ctx, c.product, input).await;

        assert_eq!(result.unwrap_err().code(), ErrorCode::IncompleteOptionSet);
        assert_eq!(saga.step(), CreationStep::Compensated);

        let stored = c.engine.get_variant(&c.ctx, saga.variant_id).await.unwrap();
        assert!(stored.variant.is_archived());
        assert!(stored.assignments.is_empty());
    }

    #[tokio::test]
    async fn unknown_value_is_not_found_and_compensated() {
        let c = coffee().await;
        let input = NewVariant::new("ghost", 1800, 3)
            .with_selection(Selection::new().with(c.size, OptionValueId::new()));
        let (result, saga) = c.engine.run_creation(&c.ctx, c.product, input).await;

        assert_eq!(result.unwrap_err().code(), ErrorCode::OptionValueNotFound);
        assert_eq!(saga.step(), CreationStep::Compensated);
    }

    #[tokio::test]
    async fn name_conflict_fails_before_anything_is_written() {
        let c = coffee().await;
        let selection = Selection::new().with(c.size, c.oz12).with(c.grind, c.whole);
        c.engine
            .create_variant(&c.ctx, c.product, NewVariant::new("House", 100, 1).with_selection(selection))
            .await
            .unwrap();

        let selection = Selection::new().with(c.size, c.lb5).with(c.grind, c.whole);
        let (result, saga) = c
            .engine
            .run_creation(&c.ctx, c.product, NewVariant::new(" house ", 100, 1).with_selection(selection))
            .await;
        assert_eq!(result.unwrap_err().code(), ErrorCode::VariantNameConflict);
        assert_eq!(saga.step(), CreationStep::Started);
        assert_eq!(
            c.engine.get_variants_by_product(&c.ctx, c.product, false).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn failed_compensation_still_reports_the_original_error() {
        let c = coffee().await;
        c.engine
            .store()
            .set_faults(FaultPlan {
                fail_discard: true,
                ..FaultPlan::default()
            })
            .unwrap();

        let input =
            NewVariant::new("12oz", 1800, 3).with_selection(Selection::new().with(c.size, c.oz12));
        let (result, saga) = c.engine.run_creation(&c.ctx, c.product, input).await;

        assert_eq!(result.unwrap_err().code(), ErrorCode::IncompleteOptionSet);
        assert_eq!(saga.step(), CreationStep::CompensationFailed);
    }

    #[tokio::test]
    async fn cancellation_mid_creation_still_compensates() {
        let c = coffee().await;
        c.engine
            .store()
            .set_faults(FaultPlan {
                assignment_delay: Some(Duration::from_secs(30)),
                ..FaultPlan::default()
            })
            .unwrap();

        let ctx = c.ctx.clone().with_timeout(Duration::from_millis(50));
        let input = NewVariant::new("slow", 1800, 3)
            .with_selection(Selection::new().with(c.size, c.oz12).with(c.grind, c.whole));
        let (result, saga) = c.engine.run_creation(&ctx, c.product, input).await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::Cancelled);
        assert_eq!(saga.step(), CreationStep::Compensated);
        let stored = c.engine.get_variant(&c.ctx, saga.variant_id).await.unwrap();
        assert!(stored.variant.is_archived());
    }

    #[tokio::test]
    async fn update_and_archive_lifecycle() {
        let c = coffee().await;
        let selection = Selection::new().with(c.size, c.lb5).with(c.grind, c.whole);
        let created = c
            .engine
            .create_variant(&c.ctx, c.product, NewVariant::new("5lb", 5400, 2).with_selection(selection))
            .await
            .unwrap();
        let id = created.variant.id;

        let updated = c
            .engine
            .update_variant(
                &c.ctx,
                id,
                VariantPatch {
                    stock: Some(9),
                    active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.variant.stock, 9);
        assert_eq!(updated.assignments, created.assignments);
        assert!(c.engine.get_variants_by_product(&c.ctx, c.product, true).await.unwrap().is_empty());

        c.engine.archive_variant(&c.ctx, id).await.unwrap();
        let err = c.engine.archive_variant(&c.ctx, id).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::AlreadyArchived);

        let err = c
            .engine
            .update_variant(
                &c.ctx,
                id,
                VariantPatch {
                    price: Some(1),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::VariantArchived);
    }

    #[tokio::test]
    async fn rename_checks_live_siblings_but_not_itself() {
        let c = coffee().await;
        c.engine
            .create_variant(
                &c.ctx,
                c.product,
                NewVariant::new("House", 1800, 1)
                    .with_selection(Selection::new().with(c.size, c.oz12).with(c.grind, c.whole)),
            )
            .await
            .unwrap();
        let bulk = c
            .engine
            .create_variant(
                &c.ctx,
                c.product,
                NewVariant::new("Bulk", 5400, 1)
                    .with_selection(Selection::new().with(c.size, c.lb5).with(c.grind, c.whole)),
            )
            .await
            .unwrap()
            .variant;

        let rename = |name: &str| VariantPatch {
            name: Some(name.to_string()),
            ..Default::default()
        };

        let err = c.engine.update_variant(&c.ctx, bulk.id, rename(" house ")).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::VariantNameConflict);
        let stored = c.engine.get_variant(&c.ctx, bulk.id).await.unwrap();
        assert_eq!(stored.variant.name, "Bulk");

        let renamed = c.engine.update_variant(&c.ctx, bulk.id, rename("BULK")).await.unwrap();
        assert_eq!(renamed.variant.name, "BULK");
        assert_eq!(renamed.variant.price, 5400);
    }
}
