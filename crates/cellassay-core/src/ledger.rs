//! Append-only JSONL ledgers for the Loop Orchestrator.
//!
//! Every belief mutation, decision, refusal, mitigation, and epistemic-debt
//! update is written as a line-delimited JSON record. Ledgers are owned
//! exclusively by the Loop; external readers (dashboards, regression
//! comparisons) are strictly observers of the files on disk.
//!
//! Six JSONL ledgers are written per run — `decisions`, `evidence`,
//! `diagnostics`, `refusals`, `mitigation`, `epistemic` — plus one terminal
//! `episode_summary.json`. (§4.5 step 11 names all six JSONL files
//! explicitly; the "five ledgers" of §6 is read as shorthand for the family
//! of append-only logs, not a count that excludes `epistemic.jsonl`.)

use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A single append-only JSONL ledger over a record type `T`.
///
/// Keeps the full in-memory history alongside the on-disk file: episodes
/// are bounded by `max_cycles`, so the working set never grows large enough
/// to justify a ring buffer, and callers (the Policy hysteresis cap, the
/// S2 evidence-count assertion) need to query the complete history.
pub struct Ledger<T> {
    path: PathBuf,
    writer: BufWriter<fs::File>,
    records: Vec<T>,
}

impl<T: Serialize + DeserializeOwned + Clone> Ledger<T> {
    /// Open (creating if absent) the JSONL file at `path` for appending.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            records: Vec::new(),
        })
    }

    /// Append a record, flushing immediately so a crash mid-run never loses
    /// a committed cycle's ledger line.
    pub fn append(&mut self, record: T) -> io::Result<()> {
        serde_json::to_writer(&mut self.writer, &record).map_err(io::Error::other)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        self.records.push(record);
        Ok(())
    }

    /// All records written so far, in append order.
    #[must_use]
    pub fn records(&self) -> &[T] {
        &self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

// ---------------------------------------------------------------------------
// Record schemas
// ---------------------------------------------------------------------------

/// A chosen action and the alternatives it beat, for one cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub cycle: u64,
    pub timestamp: String,
    #[serde(default = "decision_event_type")]
    pub event_type: String,
    pub action: String,
    pub template_name: String,
    pub score: f64,
    pub runner_up_scores: Vec<(String, f64)>,
    pub wells_used: u32,
    pub budget_remaining: u32,
    pub cost_inflation_factor: f64,
}

fn decision_event_type() -> String {
    "decision".to_string()
}

/// A belief mutation, tagged with the wells that justify it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceEvent {
    pub cycle: u64,
    pub timestamp: String,
    #[serde(default = "evidence_event_type")]
    pub event_type: String,
    pub description: String,
    pub supporting_conditions: Vec<String>,
    pub metric_source: String,
    pub delta_entropy_bits: f64,
    pub gates_earned: Vec<String>,
    pub gates_lost: Vec<String>,
}

fn evidence_event_type() -> String {
    "evidence".to_string()
}

/// Severity of a diagnostic record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Fatal,
}

/// QC flags, contract-violation traces, and other non-claim diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticRecord {
    pub cycle: u64,
    pub timestamp: String,
    #[serde(default = "diagnostic_event_type")]
    pub event_type: String,
    pub severity: Severity,
    pub message: String,
    pub qc_flags: Vec<String>,
}

fn diagnostic_event_type() -> String {
    "diagnostic".to_string()
}

/// Full provenance for a refused action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefusalRecord {
    pub cycle: u64,
    pub timestamp: String,
    #[serde(default = "refusal_event_type")]
    pub event_type: String,
    pub attempted_template: String,
    pub missing_gates: Vec<String>,
    pub debt: f64,
    pub budget_remaining: u32,
    pub enforcement_layer: String,
}

fn refusal_event_type() -> String {
    "refusal".to_string()
}

/// A scheduled mitigation (replate) event and its health-debt effect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MitigationRecord {
    pub cycle: u64,
    pub timestamp: String,
    #[serde(default = "mitigation_event_type")]
    pub event_type: String,
    pub reason: String,
    pub wells_used: u32,
    pub health_debt_before: f64,
    pub health_debt_after: f64,
}

fn mitigation_event_type() -> String {
    "mitigation".to_string()
}

/// A debt-accounting update: claimed vs. realized information gain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpistemicRecord {
    pub cycle: u64,
    pub timestamp: String,
    #[serde(default = "epistemic_event_type")]
    pub event_type: String,
    pub claimed_bits: f64,
    pub realized_bits: f64,
    pub debt_delta: f64,
    pub debt_total: f64,
    pub cost_inflation_factor: f64,
    pub insolvent: bool,
}

fn epistemic_event_type() -> String {
    "epistemic".to_string()
}

/// Terminal record summarizing the whole episode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeSummary {
    pub seed: u64,
    pub initial_budget: u32,
    pub cycles_run: u64,
    pub terminal_reason: String,
    pub wells_spent_calibration: u32,
    pub wells_spent_exploration: u32,
    pub wells_spent_mitigation: u32,
    pub entropy_reduction_bits: f64,
    pub gates_earned: Vec<String>,
    pub gates_lost: Vec<String>,
    pub mitigation_count: u32,
    pub health_debt_final: f64,
    pub epistemic_debt_final: f64,
    pub calibration_decisions: Vec<String>,
    pub distinct_templates: Vec<String>,
    pub efficiency_bits_per_plate_equivalent: f64,
}

/// All six ledgers plus the terminal summary, bundled for the Loop.
pub struct LedgerSet {
    pub decisions: Ledger<DecisionRecord>,
    pub evidence: Ledger<EvidenceEvent>,
    pub diagnostics: Ledger<DiagnosticRecord>,
    pub refusals: Ledger<RefusalRecord>,
    pub mitigation: Ledger<MitigationRecord>,
    pub epistemic: Ledger<EpistemicRecord>,
    summary_path: PathBuf,
}

impl LedgerSet {
    /// Open all six ledgers under `out_dir`, creating it if necessary.
    pub fn open(out_dir: impl AsRef<Path>) -> io::Result<Self> {
        let out_dir = out_dir.as_ref();
        Ok(Self {
            decisions: Ledger::open(out_dir.join("decisions.jsonl"))?,
            evidence: Ledger::open(out_dir.join("evidence.jsonl"))?,
            diagnostics: Ledger::open(out_dir.join("diagnostics.jsonl"))?,
            refusals: Ledger::open(out_dir.join("refusals.jsonl"))?,
            mitigation: Ledger::open(out_dir.join("mitigation.jsonl"))?,
            epistemic: Ledger::open(out_dir.join("epistemic.jsonl"))?,
            summary_path: out_dir.join("episode_summary.json"),
        })
    }

    /// Write the terminal `episode_summary.json`. Always called on every
    /// termination path (budget exhausted, max cycles, deadlock, explicit
    /// terminal action, or a caught contract violation).
    pub fn write_summary(&self, summary: &EpisodeSummary) -> io::Result<()> {
        let json = serde_json::to_string_pretty(summary).map_err(io::Error::other)?;
        fs::write(&self.summary_path, json)
    }
}
