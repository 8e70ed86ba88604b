//! A small two-collection corpus about adding function tools to an agent, and the configuration
//! that matches it.

use serde_json::Map;

use ground_config::{
	Collection, Config, Coverage, EmbeddingProviderConfig, Evidence, ProviderConfig, Providers,
	Qdrant, Rerank, RerankProviderConfig, Retry, Search, Service, Storage,
};
use ground_domain::{ContentType, HitPayload, Provenance};

use crate::{
	hashing,
	memory::{InMemoryStore, StoredPoint},
};

pub const DOCS_COLLECTION: &str = "adk_docs";
pub const CODE_COLLECTION: &str = "adk_code";
pub const SPARSE_MODEL: &str = "hash-bm25";
pub const DENSE_DIMENSIONS: u32 = 64;

const DOCS_REPO: &str = "adk-docs";
const CODE_REPO: &str = "adk-python";
const CODE_REF: &str = "v1.2.0";
const DOCS_BASE_URL: &str = "https://google.github.io/adk-docs";

/// One chunk to index, addressed by collection.
#[derive(Debug, Clone)]
pub struct ChunkSeed {
	pub id: String,
	pub collection: String,
	pub chunk_id: Option<String>,
	pub text: String,
	pub provenance: Provenance,
}
impl ChunkSeed {
	/// A documentation chunk cited by `{DOCS_BASE_URL}{page}`.
	pub fn doc(id: &str, page: &str, text: &str) -> Self {
		Self {
			id: id.to_string(),
			collection: DOCS_COLLECTION.to_string(),
			chunk_id: Some(id.to_string()),
			text: text.to_string(),
			provenance: Provenance {
				repo: Some(DOCS_REPO.to_string()),
				git_ref: Some("main".to_string()),
				path: None,
				url: Some(format!("{DOCS_BASE_URL}{page}")),
				start_line: None,
				end_line: None,
			},
		}
	}

	/// A source chunk cited by path and line span.
	pub fn code(id: &str, path: &str, lines: (u32, u32), text: &str) -> Self {
		Self {
			id: id.to_string(),
			collection: CODE_COLLECTION.to_string(),
			chunk_id: None,
			text: text.to_string(),
			provenance: Provenance {
				repo: Some(CODE_REPO.to_string()),
				git_ref: Some(CODE_REF.to_string()),
				path: Some(path.to_string()),
				url: None,
				start_line: Some(lines.0),
				end_line: Some(lines.1),
			},
		}
	}

	pub fn with_provenance(mut self, provenance: Provenance) -> Self {
		self.provenance = provenance;

		self
	}
}

pub fn function_tool_corpus() -> Vec<ChunkSeed> {
	vec![
		ChunkSeed::doc(
			"doc-function-tools",
			"/tools/function-tools/",
			"Function tools let an agent call your own Python function. Add a function tool by passing the function to the agent's tools list; ADK wraps it in a FunctionTool automatically.",
		),
		ChunkSeed::doc(
			"doc-function-signature",
			"/tools/function-tools/#parameters",
			"The function signature becomes the tool schema. Use type hints on every parameter and a docstring so the model knows how to call the tool.",
		),
		ChunkSeed::doc(
			"doc-return-values",
			"/tools/function-tools/#return-values",
			"A function tool should return a dictionary. Include a status key so the agent can tell a successful tool call from an error.",
		),
		ChunkSeed::doc(
			"doc-long-running",
			"/tools/function-tools/#long-running-function-tools",
			"Use LongRunningFunctionTool when the function needs time to finish, such as waiting for human approval before the agent continues.",
		),
		ChunkSeed::doc(
			"doc-agent-tools",
			"/agents/llm-agents/#equipping-the-agent-tools",
			"Equip an LlmAgent with tools by setting tools=[...] when you create the agent. Plain functions, FunctionTool instances, and toolsets can be mixed.",
		),
		ChunkSeed::code(
			"code-function-tool-class",
			"src/google/adk/tools/function_tool.py",
			(28, 61),
			"class FunctionTool(BaseTool):\n  \"\"\"A tool that wraps a user-defined Python function.\"\"\"\n\n  def __init__(self, func: Callable[..., Any]):\n    name = func.__name__\n    doc = inspect.cleandoc(func.__doc__ or '')\n    super().__init__(name=name, description=doc)\n    self.func = func",
		),
		ChunkSeed::code(
			"code-function-tool-run",
			"src/google/adk/tools/function_tool.py",
			(63, 104),
			"  async def run_async(self, *, args: dict[str, Any], tool_context: ToolContext) -> Any:\n    args_to_call = args.copy()\n    signature = inspect.signature(self.func)\n    if 'tool_context' in signature.parameters:\n      args_to_call['tool_context'] = tool_context\n    return self.func(**args_to_call) or {}",
		),
		ChunkSeed::code(
			"code-function-declaration",
			"src/google/adk/tools/_automatic_function_calling_util.py",
			(180, 226),
			"def build_function_declaration(func: Callable, ignore_params: list[str] | None = None) -> types.FunctionDeclaration:\n  signature = inspect.signature(func)\n  parameters = _parse_parameters(signature, ignore_params)\n  return types.FunctionDeclaration(name=func.__name__, description=func.__doc__, parameters=parameters)",
		),
		ChunkSeed::code(
			"code-llm-agent-tools",
			"src/google/adk/agents/llm_agent.py",
			(140, 162),
			"  tools: list[ToolUnion] = Field(default_factory=list)\n  \"\"\"Tools available to this agent. Plain functions are wrapped in FunctionTool.\"\"\"",
		),
		ChunkSeed::code(
			"code-convert-tool-union",
			"src/google/adk/agents/llm_agent.py",
			(88, 104),
			"def _convert_tool_union_to_tool(tool_union: ToolUnion) -> BaseTool:\n  if isinstance(tool_union, BaseTool):\n    return tool_union\n  return FunctionTool(func=tool_union)",
		),
	]
}

/// Indexes `chunks` the way ingestion would for `cfg`: each collection's dense space and the
/// shared lexical space.
pub fn seed(store: &InMemoryStore, cfg: &Config, chunks: &[ChunkSeed]) {
	for chunk in chunks {
		let Some(collection) =
			cfg.storage.qdrant.collections.iter().find(|collection| collection.name == chunk.collection)
		else {
			continue;
		};
		let space = match collection.dense_space.as_str() {
			"code" => &cfg.providers.embedding_code,
			_ => &cfg.providers.embedding_docs,
		};

		store.insert(
			&collection.name,
			StoredPoint {
				id: chunk.id.clone(),
				dense: hashing::dense_vector(&space.model, space.dimensions as usize, &chunk.text),
				sparse: hashing::sparse_vector(&chunk.text),
				payload: HitPayload {
					content_type: ContentType::parse(&collection.content_type),
					chunk_id: chunk.chunk_id.clone(),
					text: chunk.text.clone(),
					provenance: chunk.provenance.clone(),
				},
			},
		);
	}
}

/// A store already holding `chunks` for `cfg`.
pub fn seeded_store(cfg: &Config, chunks: &[ChunkSeed]) -> InMemoryStore {
	let store = InMemoryStore::new();

	seed(&store, cfg, chunks);

	store
}

/// A valid configuration for the corpus collections with millisecond retry backoff.
pub fn test_config() -> Config {
	Config {
		service: Service { log_level: "debug".to_string() },
		storage: Storage {
			qdrant: Qdrant {
				url: "http://127.0.0.1:6334".to_string(),
				api_key: None,
				timeout_ms: 1_000,
				collections: vec![
					collection(DOCS_COLLECTION, "doc", "docs"),
					collection(CODE_COLLECTION, "code", "code"),
				],
			},
		},
		providers: Providers {
			embedding_docs: embedding_provider("hash-docs"),
			embedding_code: embedding_provider("hash-code"),
			sparse: ProviderConfig {
				provider_id: "test".to_string(),
				api_base: "http://127.0.0.1:1".to_string(),
				api_key: "test-key".to_string(),
				path: "/embed_sparse".to_string(),
				model: SPARSE_MODEL.to_string(),
				timeout_ms: 1_000,
				default_headers: Map::new(),
				requests_per_minute: None,
			},
			rerank: RerankProviderConfig {
				provider_id: "test".to_string(),
				api_base: "http://127.0.0.1:1".to_string(),
				api_key: "test-key".to_string(),
				path: "/rerank".to_string(),
				model: "lexical".to_string(),
				timeout_ms: 1_000,
				max_total_tokens: 120_000,
				default_headers: Map::new(),
				requests_per_minute: None,
			},
		},
		retry: Retry { max_attempts: 3, base_backoff_ms: 1, max_backoff_ms: 2 },
		search: Search::default(),
		coverage: Coverage::default(),
		rerank: Rerank::default(),
		evidence: Evidence { top_k: 6, buffer_k: 8 },
	}
}

fn collection(name: &str, content_type: &str, dense_space: &str) -> Collection {
	Collection {
		name: name.to_string(),
		content_type: content_type.to_string(),
		dense_vector: "dense".to_string(),
		dense_space: dense_space.to_string(),
		sparse_vector: "bm25".to_string(),
		sparse_model: SPARSE_MODEL.to_string(),
	}
}

fn embedding_provider(model: &str) -> EmbeddingProviderConfig {
	EmbeddingProviderConfig {
		provider_id: "test".to_string(),
		api_base: "http://127.0.0.1:1".to_string(),
		api_key: "test-key".to_string(),
		path: "/embeddings".to_string(),
		model: model.to_string(),
		dimensions: DENSE_DIMENSIONS,
		timeout_ms: 1_000,
		input_type: "query".to_string(),
		default_headers: Map::new(),
		requests_per_minute: None,
	}
}
