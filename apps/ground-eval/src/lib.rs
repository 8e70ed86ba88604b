use std::{
	collections::HashSet,
	fs,
	path::{Path, PathBuf},
	time::Instant,
};

use clap::Parser;
use color_eyre::eyre;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ground_config::Config;
use ground_domain::TaskMode;
use ground_service::{EvidencePack, GroundService, PackStatus, QueryRequest};

#[derive(Debug, Parser)]
#[command(
	version = ground_cli::VERSION,
	rename_all = "kebab",
	styles = ground_cli::styles(),
)]
pub struct Args {
	#[arg(long = "config-a", short = 'c', value_name = "FILE", visible_alias = "config")]
	pub config_a: PathBuf,
	/// Second configuration to compare against `--config-a` over the same dataset.
	#[arg(long = "config-b", value_name = "FILE")]
	pub config_b: Option<PathBuf>,
	#[arg(long, short = 'd', value_name = "FILE")]
	pub dataset: PathBuf,
	#[arg(long, value_name = "N")]
	pub top_k: Option<u32>,
	/// Forces every query to this task mode.
	#[arg(long, value_name = "MODE", value_parser = ground_cli::parse_task_mode)]
	pub mode: Option<TaskMode>,
	#[arg(long, value_name = "N", default_value_t = 1)]
	pub runs_per_query: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EvalDataset {
	pub name: Option<String>,
	pub defaults: Option<EvalDefaults>,
	pub queries: Vec<EvalQuery>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EvalDefaults {
	pub mode: Option<TaskMode>,
	pub top_k: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EvalQuery {
	pub id: Option<String>,
	pub query: String,
	pub mode: Option<TaskMode>,
	pub top_k: Option<u32>,
	/// Relevant evidence, each entry either a `candidate_id` or a citation string.
	pub expected: Vec<String>,
}

/// Command-line overrides applied on top of the dataset.
#[derive(Debug, Clone, Default)]
pub struct EvalOptions {
	pub top_k: Option<u32>,
	pub mode: Option<TaskMode>,
	pub runs_per_query: u32,
}
impl From<&Args> for EvalOptions {
	fn from(args: &Args) -> Self {
		Self { top_k: args.top_k, mode: args.mode, runs_per_query: args.runs_per_query }
	}
}

#[derive(Debug, Serialize)]
pub struct EvalRun {
	pub dataset: EvalDatasetInfo,
	pub settings: EvalSettings,
	pub summary: EvalSummary,
	pub queries: Vec<QueryReport>,
}

#[derive(Debug, Serialize)]
pub struct EvalDatasetInfo {
	pub name: String,
	pub query_count: usize,
}

#[derive(Debug, Serialize)]
pub struct EvalSettings {
	pub config: String,
	pub top_k: u32,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub runs_per_query: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvalSummary {
	pub avg_recall_at_k: f64,
	pub avg_precision_at_k: f64,
	pub mean_rr: f64,
	pub mean_ndcg: f64,
	pub latency_ms_p50: f64,
	pub latency_ms_p95: f64,
	/// Share of queries whose pack met its content-mix requirement.
	pub coverage_satisfied_rate: f64,
	pub no_evidence_count: usize,
	pub warning_count: usize,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub stability: Option<StabilitySummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StabilitySummary {
	pub runs_per_query: u32,
	pub avg_positional_churn_at_k: f64,
	pub avg_set_churn_at_k: f64,
}

#[derive(Debug, Serialize)]
pub struct QueryReport {
	pub id: String,
	pub query: String,
	pub mode: TaskMode,
	pub trace_id: Uuid,
	pub status: PackStatus,
	pub expected_count: usize,
	pub retrieved_count: usize,
	pub relevant_count: usize,
	pub recall_at_k: f64,
	pub precision_at_k: f64,
	pub rr: f64,
	pub ndcg: f64,
	pub latency_ms: f64,
	pub coverage_satisfied: bool,
	pub warnings: usize,
	pub expected: Vec<String>,
	pub retrieved: Vec<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub stability: Option<QueryStability>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryStability {
	pub runs_per_query: u32,
	pub positional_churn_at_k: f64,
	pub set_churn_at_k: f64,
}

#[derive(Debug, Serialize)]
struct CompareOutput {
	a: EvalRun,
	b: EvalRun,
	delta: EvalSummaryDelta,
	queries: Vec<QueryDelta>,
}

#[derive(Debug, Serialize)]
struct EvalSummaryDelta {
	avg_recall_at_k: f64,
	avg_precision_at_k: f64,
	mean_rr: f64,
	mean_ndcg: f64,
	latency_ms_p50: f64,
	latency_ms_p95: f64,
	coverage_satisfied_rate: f64,
}

#[derive(Debug, Serialize)]
struct QueryDelta {
	id: String,
	recall_at_k: f64,
	ndcg: f64,
	/// Top-k churn between the two configurations' first runs.
	set_churn_at_k: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Metrics {
	recall_at_k: f64,
	precision_at_k: f64,
	rr: f64,
	ndcg: f64,
	relevant_count: usize,
}

struct QueryRuns {
	first: EvidencePack,
	latency_ms: f64,
	stability: Option<QueryStability>,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config_a = ground_config::load(&args.config_a)?;

	ground_cli::init_tracing(&config_a.service.log_level);

	let dataset = load_dataset(&args.dataset)?;
	let options = EvalOptions::from(&args);
	let run_a = eval_config(&args.config_a, config_a, &dataset, &options).await?;
	let output = match &args.config_b {
		Some(path) => {
			let config_b = ground_config::load(path)?;
			let run_b = eval_config(path, config_b, &dataset, &options).await?;

			serde_json::to_string_pretty(&compare(run_a, run_b))?
		},
		None => serde_json::to_string_pretty(&run_a)?,
	};

	println!("{output}");

	Ok(())
}

pub fn load_dataset(path: &Path) -> color_eyre::Result<EvalDataset> {
	let raw = fs::read_to_string(path)?;
	let dataset: EvalDataset = serde_json::from_str(&raw)?;

	if dataset.queries.is_empty() {
		return Err(eyre::eyre!("Dataset must include at least one query."));
	}

	Ok(dataset)
}

async fn eval_config(
	path: &Path,
	config: Config,
	dataset: &EvalDataset,
	options: &EvalOptions,
) -> color_eyre::Result<EvalRun> {
	let service = GroundService::from_config(config)?;

	evaluate(&service, &path.display().to_string(), dataset, options).await
}

/// Runs every dataset query through `retrieve` and scores the packs against the expectations.
pub async fn evaluate(
	service: &GroundService,
	config_label: &str,
	dataset: &EvalDataset,
	options: &EvalOptions,
) -> color_eyre::Result<EvalRun> {
	let defaults = dataset.defaults.clone().unwrap_or_default();
	let runs_per_query = options.runs_per_query.max(1);
	let mut reports = Vec::with_capacity(dataset.queries.len());
	let mut latencies_ms = Vec::with_capacity(dataset.queries.len());

	for (index, query) in dataset.queries.iter().enumerate() {
		if query.expected.is_empty() {
			return Err(eyre::eyre!("Query at index {index} must include at least one expected entry."));
		}

		let mode = options.mode.or(query.mode).or(defaults.mode).unwrap_or_default();
		let top_k = options.top_k.or(query.top_k).or(defaults.top_k);
		let mut request = QueryRequest::new(query.query.clone(), mode);

		request.top_k = top_k;

		let runs = run_query_n_times(service, request, runs_per_query).await?;
		let expected: HashSet<&str> = query.expected.iter().map(String::as_str).collect();
		let retrieved = retrieved_keys(&runs.first, &expected);
		let metrics = compute_metrics(&retrieved, &expected);

		latencies_ms.push(runs.latency_ms);
		reports.push(QueryReport {
			id: query.id.clone().unwrap_or_else(|| format!("query-{index}")),
			query: query.query.clone(),
			mode,
			trace_id: runs.first.diagnostics.trace_id,
			status: runs.first.status,
			expected_count: expected.len(),
			retrieved_count: retrieved.len(),
			relevant_count: metrics.relevant_count,
			recall_at_k: metrics.recall_at_k,
			precision_at_k: metrics.precision_at_k,
			rr: metrics.rr,
			ndcg: metrics.ndcg,
			latency_ms: runs.latency_ms,
			coverage_satisfied: runs.first.coverage.satisfied,
			warnings: runs.first.warnings.len(),
			expected: query.expected.clone(),
			retrieved,
			stability: runs.stability,
		});
	}

	let mut summary = summarize(&reports, &latencies_ms);
	let churns: Vec<&QueryStability> =
		reports.iter().filter_map(|report| report.stability.as_ref()).collect();

	if runs_per_query > 1 && !churns.is_empty() {
		let count = churns.len() as f64;

		summary.stability = Some(StabilitySummary {
			runs_per_query,
			avg_positional_churn_at_k: churns.iter().map(|s| s.positional_churn_at_k).sum::<f64>()
				/ count,
			avg_set_churn_at_k: churns.iter().map(|s| s.set_churn_at_k).sum::<f64>() / count,
		});
	}

	tracing::info!(
		config = %config_label,
		queries = reports.len(),
		recall = summary.avg_recall_at_k,
		ndcg = summary.mean_ndcg,
		"Evaluation finished."
	);

	Ok(EvalRun {
		dataset: EvalDatasetInfo {
			name: dataset.name.clone().unwrap_or_else(|| "eval".to_string()),
			query_count: reports.len(),
		},
		settings: EvalSettings {
			config: config_label.to_string(),
			top_k: options.top_k.or(defaults.top_k).unwrap_or(service.cfg.evidence.top_k),
			runs_per_query: (runs_per_query > 1).then_some(runs_per_query),
		},
		summary,
		queries: reports,
	})
}

async fn run_query_n_times(
	service: &GroundService,
	request: QueryRequest,
	runs: u32,
) -> color_eyre::Result<QueryRuns> {
	let mut first: Option<(EvidencePack, Vec<String>)> = None;
	let mut latency_total_ms = 0.0_f64;
	let mut positional_churn_sum = 0.0_f64;
	let mut set_churn_sum = 0.0_f64;
	let mut churn_count = 0_u32;

	for _ in 0..runs.max(1) {
		let start = Instant::now();
		let pack = service.retrieve(request.clone()).await?;

		latency_total_ms += start.elapsed().as_secs_f64() * 1_000.0;

		let ids = unique_keys(pack.items.iter().map(|item| item.candidate_id.clone()));

		match &first {
			None => first = Some((pack, ids)),
			Some((baseline, baseline_ids)) => {
				let k = baseline.diagnostics.request.top_k.max(1) as usize;
				let (positional, set) = churn_against_baseline_at_k(baseline_ids, &ids, k);

				positional_churn_sum += positional;
				set_churn_sum += set;
				churn_count += 1;
			},
		}
	}

	let (first, _) = first.ok_or_else(|| eyre::eyre!("No evidence packs were collected."))?;
	let stability = (churn_count > 0).then(|| QueryStability {
		runs_per_query: runs,
		positional_churn_at_k: positional_churn_sum / churn_count as f64,
		set_churn_at_k: set_churn_sum / churn_count as f64,
	});

	Ok(QueryRuns { first, latency_ms: latency_total_ms / runs.max(1) as f64, stability })
}

/// Names each item by whichever of its identities the dataset uses, falling back to the citation.
fn retrieved_keys(pack: &EvidencePack, expected: &HashSet<&str>) -> Vec<String> {
	unique_keys(pack.items.iter().map(|item| {
		if expected.contains(item.candidate_id.as_str()) {
			item.candidate_id.clone()
		} else {
			item.citation.clone()
		}
	}))
}

fn unique_keys<I>(iter: I) -> Vec<String>
where
	I: Iterator<Item = String>,
{
	let mut seen = HashSet::new();
	let mut out = Vec::new();

	for key in iter {
		if seen.insert(key.clone()) {
			out.push(key);
		}
	}

	out
}

fn compute_metrics(retrieved: &[String], expected: &HashSet<&str>) -> Metrics {
	let mut relevant_count = 0_usize;
	let mut dcg = 0.0_f64;
	let mut first_hit = None;

	for (idx, key) in retrieved.iter().enumerate() {
		if !expected.contains(key.as_str()) {
			continue;
		}

		let rank = idx + 1;

		relevant_count += 1;
		dcg += 1.0 / (rank as f64 + 1.0).log2();
		first_hit.get_or_insert(rank);
	}

	let idcg: f64 = (1..=expected.len().min(retrieved.len()))
		.map(|rank| 1.0 / (rank as f64 + 1.0).log2())
		.sum();

	Metrics {
		recall_at_k: if expected.is_empty() {
			0.0
		} else {
			relevant_count as f64 / expected.len() as f64
		},
		precision_at_k: if retrieved.is_empty() {
			0.0
		} else {
			relevant_count as f64 / retrieved.len() as f64
		},
		rr: first_hit.map(|rank| 1.0 / rank as f64).unwrap_or(0.0),
		ndcg: if idcg > 0.0 { dcg / idcg } else { 0.0 },
		relevant_count,
	}
}

fn churn_against_baseline_at_k(baseline: &[String], other: &[String], k: usize) -> (f64, f64) {
	let k = k.max(1);
	let positional_diff = (0..k).filter(|&idx| baseline.get(idx) != other.get(idx)).count();
	let base_set: HashSet<&String> = baseline.iter().take(k).collect();
	let other_set: HashSet<&String> = other.iter().take(k).collect();
	let overlap = base_set.intersection(&other_set).count();

	(positional_diff as f64 / k as f64, 1.0 - overlap as f64 / k as f64)
}

fn summarize(reports: &[QueryReport], latencies_ms: &[f64]) -> EvalSummary {
	let count = reports.len().max(1) as f64;
	let mean = |f: fn(&QueryReport) -> f64| reports.iter().map(f).sum::<f64>() / count;
	let mut sorted = latencies_ms.to_vec();

	sorted.sort_by(f64::total_cmp);

	EvalSummary {
		avg_recall_at_k: mean(|r| r.recall_at_k),
		avg_precision_at_k: mean(|r| r.precision_at_k),
		mean_rr: mean(|r| r.rr),
		mean_ndcg: mean(|r| r.ndcg),
		latency_ms_p50: percentile(&sorted, 0.50),
		latency_ms_p95: percentile(&sorted, 0.95),
		coverage_satisfied_rate: mean(|r| if r.coverage_satisfied { 1.0 } else { 0.0 }),
		no_evidence_count: reports
			.iter()
			.filter(|report| report.status == PackStatus::NoEvidence)
			.count(),
		warning_count: reports.iter().map(|report| report.warnings).sum(),
		stability: None,
	}
}

fn percentile(values: &[f64], percentile: f64) -> f64 {
	if values.is_empty() {
		return 0.0;
	}

	let pos = percentile.clamp(0.0, 1.0) * (values.len() as f64 - 1.0);
	let lower = pos.floor() as usize;
	let upper = pos.ceil() as usize;

	if lower == upper {
		values[lower]
	} else {
		let weight = pos - lower as f64;

		values[lower] * (1.0 - weight) + values[upper] * weight
	}
}

fn compare(a: EvalRun, b: EvalRun) -> CompareOutput {
	let delta = EvalSummaryDelta {
		avg_recall_at_k: b.summary.avg_recall_at_k - a.summary.avg_recall_at_k,
		avg_precision_at_k: b.summary.avg_precision_at_k - a.summary.avg_precision_at_k,
		mean_rr: b.summary.mean_rr - a.summary.mean_rr,
		mean_ndcg: b.summary.mean_ndcg - a.summary.mean_ndcg,
		latency_ms_p50: b.summary.latency_ms_p50 - a.summary.latency_ms_p50,
		latency_ms_p95: b.summary.latency_ms_p95 - a.summary.latency_ms_p95,
		coverage_satisfied_rate: b.summary.coverage_satisfied_rate
			- a.summary.coverage_satisfied_rate,
	};
	let queries = a
		.queries
		.iter()
		.zip(&b.queries)
		.map(|(qa, qb)| {
			let k = qa.retrieved.len().max(qb.retrieved.len());
			let (_, set_churn_at_k) = churn_against_baseline_at_k(&qa.retrieved, &qb.retrieved, k);

			QueryDelta {
				id: qa.id.clone(),
				recall_at_k: qb.recall_at_k - qa.recall_at_k,
				ndcg: qb.ndcg - qa.ndcg,
				set_churn_at_k,
			}
		})
		.collect();

	CompareOutput { a, b, delta, queries }
}

#[cfg(test)]
mod tests {
	use super::*;

	fn keys(values: &[&str]) -> Vec<String> {
		values.iter().map(|value| value.to_string()).collect()
	}

	fn assert_close(actual: f64, expected: f64) {
		assert!((actual - expected).abs() < 1e-9, "Expected {expected}, got {actual}.");
	}

	#[test]
	fn metrics_reward_early_relevant_hits() {
		let expected: HashSet<&str> = ["b", "d"].into_iter().collect();
		let metrics = compute_metrics(&keys(&["a", "b", "c", "d"]), &expected);

		assert_eq!(metrics.relevant_count, 2);
		assert_close(metrics.recall_at_k, 1.0);
		assert_close(metrics.precision_at_k, 0.5);
		assert_close(metrics.rr, 0.5);

		let dcg = 1.0 / 3.0_f64.log2() + 1.0 / 5.0_f64.log2();
		let idcg = 1.0 + 1.0 / 3.0_f64.log2();

		assert_close(metrics.ndcg, dcg / idcg);
	}

	#[test]
	fn empty_results_score_zero() {
		let expected: HashSet<&str> = ["a"].into_iter().collect();
		let metrics = compute_metrics(&[], &expected);

		assert_eq!(metrics, Metrics {
			recall_at_k: 0.0,
			precision_at_k: 0.0,
			rr: 0.0,
			ndcg: 0.0,
			relevant_count: 0,
		});
	}

	#[test]
	fn churn_separates_reordering_from_replacement() {
		let baseline = keys(&["a", "b", "c"]);

		assert_eq!(churn_against_baseline_at_k(&baseline, &baseline, 3), (0.0, 0.0));

		let (positional, set) = churn_against_baseline_at_k(&baseline, &keys(&["b", "a", "c"]), 3);

		assert_close(positional, 2.0 / 3.0);
		assert_close(set, 0.0);

		let (positional, set) = churn_against_baseline_at_k(&baseline, &keys(&["a", "b", "x"]), 3);

		assert_close(positional, 1.0 / 3.0);
		assert_close(set, 1.0 / 3.0);
	}

	#[test]
	fn percentile_interpolates_between_neighbours() {
		assert_close(percentile(&[10.0, 20.0, 30.0, 40.0], 0.5), 25.0);
		assert_close(percentile(&[7.0], 0.95), 7.0);
		assert_close(percentile(&[], 0.5), 0.0);
	}

	#[test]
	fn duplicate_keys_count_once() {
		assert_eq!(unique_keys(keys(&["a", "b", "a"]).into_iter()), keys(&["a", "b"]));
	}
}
