//! Randomized workload simulator
//!
//! Drives a coordinator the way a user would (typing bursts in the grid,
//! dragging cards on the board) against a backend that fails at random, then
//! checks that the view converged:
//! - no record is left dirty once everything settled
//! - every record in view equals the server's copy
//! - a typing burst never produced more than one write
//! - drops on the current column left the card where it was
//! - every move settled to a final state

use crate::service::FlakyService;
use dash_record::{
    Entity, Expense, ExpenseField, ListQuery, Opportunity, OpportunityField, PipelineStage,
    Record, RecordId,
};
use dash_sync::{
    Coordinator, CoordinatorConfig, DataService, StatsSnapshot, Transition, TransitionState,
};
use futures::future::join_all;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Simulator configuration
#[derive(Debug, Clone, Serialize)]
pub struct SimulatorConfig {
    /// Random seed for reproducibility
    pub seed: u64,
    /// Records in view
    pub records: u64,
    /// Typing bursts (grid) or drops (board)
    pub operations: u64,
    /// Longest typing burst
    pub max_keystrokes: u32,
    /// Probability that a write fails
    pub failure_rate: f64,
    /// Base backend latency
    pub latency_ms: u64,
    /// Coordinator settings
    pub coordinator: CoordinatorConfig,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            records: 20,
            operations: 100,
            max_keystrokes: 6,
            failure_rate: 0.1,
            latency_ms: 15,
            coordinator: CoordinatorConfig::default().with_debounce(Duration::from_millis(60)),
        }
    }
}

/// Invariant broken during a run
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    /// Record still has unconfirmed edits after quiescence
    DirtyAfterSettle {
        /// Offending record
        record: RecordId,
    },
    /// View and server disagree after quiescence
    Diverged {
        /// Offending record
        record: RecordId,
        /// View copy
        view: String,
        /// Server copy
        server: String,
    },
    /// More writes than typing bursts
    WritesExceedBursts {
        /// Writes issued
        writes: u64,
        /// Bursts typed
        bursts: u64,
    },
    /// A same-column drop reported a card that was not in that column
    NoopDisplaced {
        /// Offending card
        record: RecordId,
    },
    /// A move never reached a final state
    Unsettled {
        /// Offending card
        record: RecordId,
        /// State observed
        state: String,
    },
}

/// Workload kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Workload {
    /// Expense grid with typing bursts
    Grid,
    /// Opportunity board with drag moves
    Pipeline,
}

/// Final report
#[derive(Debug, Clone, Serialize)]
pub struct SimulatorReport {
    /// Workload run
    pub workload: Workload,
    /// Settings used
    pub config: SimulatorConfig,
    /// Coordinator counters at the end
    pub stats: StatsSnapshot,
    /// Drops on the current column
    pub noop_moves: u64,
    /// Moves that rolled back
    pub rolled_back: u64,
    /// Broken invariants
    pub violations: Vec<Violation>,
}

impl SimulatorReport {
    /// True if no invariant broke
    #[must_use]
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    /// Human-readable report
    #[must_use]
    pub fn generate_text(&self) -> String {
        let stats = &self.stats;
        let mut report = String::new();
        report.push_str(&format!("=== Dashboard Simulator Report ({:?}) ===\n\n", self.workload));
        report.push_str(&format!("Seed: {}\n", self.config.seed));
        report.push_str(&format!("Records: {}\n", self.config.records));
        report.push_str(&format!("Operations: {}\n", self.config.operations));
        report.push_str(&format!("Failure Rate: {:.2}\n", self.config.failure_rate));
        report.push_str(&format!("Edits: {}\n", stats.edits));
        report.push_str(&format!("Moves: {} (+{} no-op)\n", stats.moves, self.noop_moves));
        report.push_str(&format!("Writes Issued: {}\n", stats.writes_issued));
        report.push_str(&format!("Writes Confirmed: {}\n", stats.writes_confirmed));
        report.push_str(&format!("Writes Failed: {}\n", stats.writes_failed));
        report.push_str(&format!("Stale Responses: {}\n", stats.stale_responses));
        report.push_str(&format!("Moves Rolled Back: {}\n", self.rolled_back));
        report.push_str(&format!("Coalescing Ratio: {:.2}\n", stats.coalescing_ratio()));
        report.push_str(&format!("Violations: {}\n", self.violations.len()));

        if !self.violations.is_empty() {
            report.push_str("\n=== Violations ===\n");
            for (i, violation) in self.violations.iter().enumerate() {
                report.push_str(&format!("{}. {:?}\n", i + 1, violation));
            }
        }

        report.push_str(&format!(
            "\n=== Result: {} ===\n",
            if self.passed() { "PASS" } else { "FAIL" }
        ));
        report
    }
}

/// Type bursts of keystrokes into an expense grid
///
/// # Errors
///
/// Returns an error if the coordinator cannot be built or the view cannot load.
pub async fn run_grid(config: SimulatorConfig) -> anyhow::Result<SimulatorReport> {
    anyhow::ensure!(config.records > 0, "simulation needs at least one record");
    let mut rng = StdRng::seed_from_u64(config.seed);
    let seed_records: Vec<Record<Expense>> = (1..=config.records)
        .map(|id| {
            Record::new(RecordId::new(id))
                .with(ExpenseField::Vendor, format!("Vendor {id}"))
                .with(ExpenseField::Amount, format!("{}", id * 10))
        })
        .collect();
    let (service, coordinator) = setup(&config, seed_records).await?;

    let debounce = coordinator.config().debounce();
    let fields = [ExpenseField::Amount, ExpenseField::Vendor, ExpenseField::Notes];
    let max_gap = u64::try_from(debounce.as_millis() / 2).unwrap_or(1).max(1);

    for burst in 0..config.operations {
        let id = RecordId::new(rng.random_range(1..=config.records));
        let field = fields[rng.random_range(0..fields.len())];
        let keystrokes = rng.random_range(1..=config.max_keystrokes.max(1));
        let mut text = String::new();
        for key in 0..keystrokes {
            text.push(char::from(b'a' + u8::try_from(key % 26).unwrap_or(0)));
            coordinator.edit_cell(id, field, format!("{burst}-{text}"))?;
            tokio::time::sleep(Duration::from_millis(rng.random_range(0..max_gap))).await;
        }
        // quiet period long enough to let the burst commit on its own
        tokio::time::sleep(debounce * 2).await;
    }

    quiesce(&coordinator, &config).await;
    let mut violations = check_convergence(&service, &coordinator);
    let stats = coordinator.stats();
    if stats.writes_issued > config.operations {
        violations.push(Violation::WritesExceedBursts {
            writes: stats.writes_issued,
            bursts: config.operations,
        });
    }

    Ok(SimulatorReport {
        workload: Workload::Grid,
        config,
        stats,
        noop_moves: 0,
        rolled_back: 0,
        violations,
    })
}

/// Drag cards between board columns
///
/// # Errors
///
/// Returns an error if the coordinator cannot be built or the view cannot load.
pub async fn run_pipeline(config: SimulatorConfig) -> anyhow::Result<SimulatorReport> {
    anyhow::ensure!(config.records > 0, "simulation needs at least one record");
    let mut rng = StdRng::seed_from_u64(config.seed);
    let stages = PipelineStage::ALL;
    let seed_records: Vec<Record<Opportunity>> = (1..=config.records)
        .map(|id| {
            let stage = stages[rng.random_range(0..stages.len())];
            Record::new(RecordId::new(id))
                .with(OpportunityField::Name, format!("Deal {id}"))
                .with(OpportunityField::Stage, stage)
        })
        .collect();
    let (service, coordinator) = setup(&config, seed_records).await?;

    let mut violations = Vec::new();
    let mut transitions: Vec<Transition> = Vec::new();
    let mut noop_moves = 0;

    for _ in 0..config.operations {
        let id = RecordId::new(rng.random_range(1..=config.records));
        let target = stages[rng.random_range(0..stages.len())];
        let transition = coordinator.move_record(id, target)?;

        if transition.is_noop() {
            noop_moves += 1;
            let current = coordinator.store().value(id, OpportunityField::Stage);
            if current.as_ref() != Some(transition.to()) {
                violations.push(Violation::NoopDisplaced { record: id });
            }
        }
        transitions.push(transition);
        tokio::time::sleep(Duration::from_millis(rng.random_range(0..=config.latency_ms))).await;
    }

    let outcomes = join_all(transitions.into_iter().map(|transition| {
        let id = transition.record_id();
        async move { (id, transition.settled().await) }
    }))
    .await;

    let mut rolled_back = 0;
    for (id, outcome) in outcomes {
        match outcome.state {
            TransitionState::Idle | TransitionState::Confirmed => {}
            TransitionState::RolledBack => rolled_back += 1,
            other => violations.push(Violation::Unsettled {
                record: id,
                state: format!("{other:?}"),
            }),
        }
    }

    quiesce(&coordinator, &config).await;
    violations.extend(check_convergence(&service, &coordinator));

    Ok(SimulatorReport {
        workload: Workload::Pipeline,
        config,
        stats: coordinator.stats(),
        noop_moves,
        rolled_back,
        violations,
    })
}

async fn setup<E: Entity>(
    config: &SimulatorConfig,
    records: Vec<Record<E>>,
) -> anyhow::Result<(Arc<FlakyService<E>>, Coordinator<E>)> {
    let service = Arc::new(FlakyService::new(
        records,
        config.seed.wrapping_add(1),
        config.failure_rate,
        Duration::from_millis(config.latency_ms),
    ));
    let dyn_service: Arc<dyn DataService<E>> = service.clone();
    let coordinator = Coordinator::new(dyn_service, config.coordinator.clone())?;
    let loaded = coordinator.load(&ListQuery::new()).await?;
    tracing::info!(kind = E::KIND, loaded, "simulation view loaded");
    Ok((service, coordinator))
}

/// Wait until timers, writes and post-failure refreshes are done
async fn quiesce<E: Entity>(coordinator: &Coordinator<E>, config: &SimulatorConfig) {
    let settle = coordinator.config().debounce() + Duration::from_millis(config.latency_ms * 4);
    loop {
        tokio::time::sleep(settle).await;
        let outcome = coordinator.flush_all().await;
        let idle = outcome.succeeded.is_empty() && outcome.failed.is_empty();
        if idle && !coordinator.has_unsaved_changes() {
            break;
        }
    }
    // post-failure refreshes run after the write settles
    tokio::time::sleep(settle).await;
}

fn check_convergence<E: Entity>(
    service: &FlakyService<E>,
    coordinator: &Coordinator<E>,
) -> Vec<Violation> {
    let mut violations = Vec::new();
    for server in service.snapshot() {
        let id = server.id();
        if coordinator.is_dirty(id) {
            violations.push(Violation::DirtyAfterSettle { record: id });
        }
        match coordinator.record(id) {
            Some(view) if view == server => {}
            view => violations.push(Violation::Diverged {
                record: id,
                view: format!("{view:?}"),
                server: format!("{server:?}"),
            }),
        }
    }
    violations
}
