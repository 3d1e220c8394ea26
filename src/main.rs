use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use nestrag::config::Config;
use nestrag::context::ContextAssembler;
use nestrag::embedding::EmbeddingProvider;
use nestrag::embedding::hashed::HashedEmbeddingProvider;
use nestrag::embedding::local::LocalEmbeddingProvider;
use nestrag::embedding::openai::OpenAIEmbeddingProvider;
use nestrag::graph::{GraphNode, GraphReader, InMemoryGraph};
use nestrag::index::{metadata, CorpusIndex, VectorIndex};
use nestrag::logging;
use nestrag::search::{RankedResult, RetrievalContext, RetrievalEngine, RetrievalOptions};
use nestrag::store::RecordStore;

#[derive(Parser)]
#[command(name = "nestrag", version, about = "Hybrid product and recipe retrieval")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Rank the top distinct products/recipes for a question
    Query {
        query: String,
        /// Number of distinct results (default: retrieval.top_n)
        #[arg(long)]
        top_n: Option<usize>,
        /// graph_boost or lexical_hybrid (default: retrieval.strategy)
        #[arg(long)]
        strategy: Option<String>,
        /// Also print the assembled context block
        #[arg(long)]
        context: bool,
    },
    /// Pool vector and graph hits, filtered by detected intent
    Combined {
        query: String,
        #[arg(long, default_value_t = 5)]
        top_k: usize,
    },
    /// Print the full context block for one product or recipe
    Context {
        name: String,
    },
    /// Graph traversal queries
    Graph {
        #[command(subcommand)]
        action: GraphAction,
    },
    /// Show counts for the loaded data files
    Stats,
}

#[derive(Subcommand)]
enum GraphAction {
    /// Recipes whose ingredient lines mention a product
    RecipesForProduct {
        name: String,
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },
    /// Products sharing an ingredient with a recipe
    ProductsForRecipe {
        title: String,
    },
    /// Products and recipes connected to an ingredient
    Ingredient {
        name: String,
    },
    /// Products sharing at least one ingredient with a product
    Similar {
        name: String,
    },
    /// Ingredients of a product or recipe
    Ingredients {
        name: String,
    },
}

/// Create the embedding provider based on configuration.
async fn create_embedding_provider(config: &Config) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.embedding.provider.as_str() {
        "openai" => {
            let api_key = config.embedding.openai_api_key.clone()
                .ok_or_else(|| anyhow::anyhow!(
                    "OpenAI API key required when provider is 'openai'. \
                     Set NESTRAG_EMBEDDING__OPENAI_API_KEY or embedding.openai_api_key in nestrag.toml"
                ))?;
            Ok(Arc::new(OpenAIEmbeddingProvider::new(api_key, config.embedding.openai_model.clone())?))
        }
        "hashed" => Ok(Arc::new(HashedEmbeddingProvider::new(config.embedding.hashed_dimension))),
        "local" => Ok(Arc::new(LocalEmbeddingProvider::new(&config.embedding.cache_dir).await?)),
        other => anyhow::bail!("Unknown embedding provider '{}': expected local, openai or hashed", other),
    }
}

async fn load_engine(config: &Config, strategy: Option<&str>) -> Result<RetrievalEngine> {
    let mut options = RetrievalOptions::from_config(&config.retrieval)?;
    if let Some(s) = strategy {
        options.strategy = s.parse()?;
    }
    let embedder = create_embedding_provider(config).await?;
    let ctx = RetrievalContext::load(config, embedder)?;
    Ok(RetrievalEngine::new(Arc::new(ctx), options))
}

fn load_records(config: &Config) -> Result<RecordStore> {
    Ok(RecordStore::load(&config.data.products_path, config.data.recipes_path.as_deref())?)
}

fn print_results(results: &[RankedResult]) {
    if results.is_empty() {
        println!("No results.");
        return;
    }
    for (i, r) in results.iter().enumerate() {
        let meta = &r.metadata;
        println!(
            "{}. [{:.3}] {} ({}) | {} | {}",
            i + 1,
            r.score,
            meta.entity_name(),
            meta.source(),
            meta.brand().unwrap_or("-"),
            meta.category().unwrap_or("-"),
        );
        println!(
            "   semantic {:.3}  boost {:.2}  lexical {:.3}",
            r.breakdown.semantic, r.breakdown.boost, r.breakdown.lexical
        );
        if let Some(url) = meta.url() {
            println!("   {}", url);
        }
    }
}

fn print_names(names: &[String], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(names)?);
    } else if names.is_empty() {
        println!("No results.");
    } else {
        for name in names {
            println!("- {}", name);
        }
    }
    Ok(())
}

fn print_nodes(nodes: &[GraphNode], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(nodes)?);
        return Ok(());
    }
    if nodes.is_empty() {
        println!("No results.");
    }
    for node in nodes {
        match node.url.as_deref() {
            Some(url) => println!("- {} ({})", node.name, url),
            None => println!("- {}", node.name),
        }
    }
    Ok(())
}

async fn run_graph(config: &Config, action: GraphAction, json: bool) -> Result<()> {
    let graph = InMemoryGraph::load(&config.data.graph_path)?;
    match action {
        GraphAction::RecipesForProduct { name, limit } => {
            print_nodes(&graph.recipes_mentioning_product(&name, limit).await?, json)
        }
        GraphAction::ProductsForRecipe { title } => {
            print_nodes(&graph.products_used_in_recipe(&title).await?, json)
        }
        GraphAction::Similar { name } => print_names(&graph.similar_products(&name).await?, json),
        GraphAction::Ingredients { name } => print_names(&graph.ingredients_of(&name).await?, json),
        GraphAction::Ingredient { name } => match graph.ingredient_connections(&name).await? {
            Some(conn) if json => {
                println!("{}", serde_json::to_string_pretty(&conn)?);
                Ok(())
            }
            Some(conn) => {
                println!("Ingredient: {}", conn.ingredient);
                println!("Products:");
                print_names(&conn.products, false)?;
                println!("Recipes:");
                print_names(&conn.recipes, false)
            }
            None => {
                println!("No ingredient named '{}' in the graph.", name);
                Ok(())
            }
        },
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration (defaults + nestrag.toml + NESTRAG_* env vars)
    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Config error (using defaults): {}", e);
        Config::default()
    });

    // Initialize structured logging to stderr
    logging::init_logging(&config);

    match cli.command {
        Commands::Query { query, top_n, strategy, context } => {
            let engine = load_engine(&config, strategy.as_deref()).await?;
            let top_n = top_n.unwrap_or(config.retrieval.top_n);
            let results = engine.retrieve(&query, top_n).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                print_results(&results);
            }
            if context {
                let assembler = ContextAssembler::new(engine.context().records(), config.context.max_chars);
                println!("\n{}", assembler.build_context(&results));
            }
        }
        Commands::Combined { query, top_k } => {
            let engine = load_engine(&config, None).await?;
            let combined = engine.combined_retrieve(&query, top_k).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&combined)?);
            } else {
                println!("Detected intent: {:?}", combined.intent);
                if combined.hits.is_empty() {
                    println!("No results.");
                }
                for hit in &combined.hits {
                    println!(
                        "- {} {} | {} | {}",
                        hit.origin(),
                        hit.source(),
                        hit.label(),
                        hit.url().unwrap_or("-")
                    );
                }
            }
        }
        Commands::Context { name } => {
            let records = load_records(&config)?;
            let assembler = ContextAssembler::new(&records, config.context.max_chars);
            match assembler.assemble_context(&name) {
                Some(text) => println!("{}", text),
                None => println!("No structured data found for '{}'.", name),
            }
        }
        Commands::Graph { action } => {
            run_graph(&config, action, cli.json).await?;
        }
        Commands::Stats => {
            let data = &config.data;
            let index = CorpusIndex::new(
                VectorIndex::load(&data.index_path)?,
                metadata::load_metadata(&data.metadata_path)?,
            )?;
            let records = load_records(&config)?;
            let graph = InMemoryGraph::load(&data.graph_path)?;

            let stats = serde_json::json!({
                "chunks": index.len(),
                "model": index.model(),
                "dimension": index.dimension(),
                "duplicate_chunk_texts": metadata::count_duplicate_texts(index.metadata()),
                "products": records.product_count(),
                "recipes": records.recipe_count(),
                "graph_nodes": graph.node_count(),
                "graph_edges": graph.edge_count(),
            });
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else if let Some(fields) = stats.as_object() {
                for (key, value) in fields {
                    println!("{}: {}", key, value);
                }
            }
        }
    }

    Ok(())
}
