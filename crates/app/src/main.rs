use chrono::Utc;
use clap::{Parser, Subcommand};
use paperminer_core::{
    paper_id_for, search_similar_chunks, ChatReply, ChatSession, ChunkStore, Embedder,
    EmbeddingEngine, Grounding, IndexingPipeline, LlmClient, LopdfExtractor,
    OpenAiCompatibleClient, RagConfig, SqliteChunkStore, DEFAULT_TARGET_LANGUAGE,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "paperminer", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Settings file (created with defaults when missing)
    #[arg(long, env = "PAPERMINER_CONFIG", default_value = "settings.json")]
    config: PathBuf,

    /// SQLite database holding indexed chunks
    #[arg(long, env = "PAPERMINER_DB", default_value = "library.db")]
    db: PathBuf,
}

#[derive(Subcommand)]
enum Command {
    /// Extract, chunk and embed one PDF, replacing its stored chunks.
    Index {
        /// PDF file to index.
        #[arg(long)]
        pdf: PathBuf,
        /// Paper id to store chunks under. Defaults to a hash of the path.
        #[arg(long)]
        paper_id: Option<String>,
    },
    /// Index every PDF below a folder.
    IndexFolder {
        /// Folder that contains PDFs recursively.
        #[arg(long)]
        folder: PathBuf,
    },
    /// Rank stored chunks against a query without calling the language model.
    Search {
        #[arg(long)]
        query: String,
        /// Restrict to one paper; searches the whole library otherwise.
        #[arg(long)]
        paper_id: Option<String>,
        /// Number of passages to return. Defaults to the configured top-k.
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Ask a question grounded in one paper or the whole library.
    Chat {
        /// First message. Required unless `--interactive` is set.
        #[arg(long, required_unless_present = "interactive")]
        message: Option<String>,
        #[arg(long)]
        paper_id: Option<String>,
        /// Skip retrieval entirely.
        #[arg(long, default_value_t = false)]
        no_rag: bool,
        /// Keep reading messages from stdin on one conversation.
        /// `/clear` resets the history and `/quit` exits.
        #[arg(long, default_value_t = false)]
        interactive: bool,
    },
    /// Explain a passage.
    Explain {
        #[arg(long)]
        text: String,
    },
    /// Translate a passage, preserving terminology.
    Translate {
        #[arg(long)]
        text: String,
        #[arg(long, default_value = DEFAULT_TARGET_LANGUAGE)]
        lang: String,
    },
    /// List papers that have stored chunks.
    Papers,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = RagConfig::load(&cli.config)?;
    config.apply_env_overrides();
    config.chunking.validate()?;

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        config = %cli.config.display(),
        "paperminer boot"
    );

    let store = Arc::new(SqliteChunkStore::open(&cli.db)?);
    let embedder = Arc::new(EmbeddingEngine::from_config(&config.embedding)?);

    match cli.command {
        Command::Index { pdf, paper_id } => {
            let pipeline = IndexingPipeline::new(LopdfExtractor, embedder, config.chunking)?;
            let paper_id = paper_id.unwrap_or_else(|| paper_id_for(&pdf));
            let chunks = pipeline.index_paper(&pdf).await?;

            if chunks.is_empty() {
                warn!(path = %pdf.display(), "no text could be extracted; nothing stored");
                println!("0 chunks indexed for {}", pdf.display());
                return Ok(());
            }

            store.replace_chunks(&paper_id, &chunks).await?;
            let embedded = chunks.iter().filter(|chunk| chunk.is_indexed()).count();
            println!(
                "{} chunks ({} embedded) indexed for paper {} at {}",
                chunks.len(),
                embedded,
                paper_id,
                Utc::now().to_rfc3339()
            );
        }
        Command::IndexFolder { folder } => {
            let pipeline = IndexingPipeline::new(LopdfExtractor, embedder, config.chunking)?;
            let report = pipeline.index_folder(&folder).await?;

            for skipped in &report.skipped_files {
                warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped pdf");
            }

            for paper in &report.papers {
                store.replace_chunks(&paper.paper_id, &paper.chunks).await?;
                println!(
                    "{} chunks indexed for {} (paper {})",
                    paper.chunks.len(),
                    paper.path.display(),
                    paper.paper_id
                );
            }
            println!(
                "{} papers indexed, {} skipped",
                report.papers.len(),
                report.skipped_files.len()
            );
        }
        Command::Search {
            query,
            paper_id,
            top_k,
        } => {
            let chunks = match &paper_id {
                Some(paper_id) => store.chunks_for_paper(paper_id).await?,
                None => store.all_chunks().await?,
            };
            let query_vector = embedder
                .embed(&[query.clone()])
                .await
                .into_iter()
                .next()
                .unwrap_or_default();

            if query_vector.is_empty() {
                println!("query could not be embedded; check the embedding settings");
                return Ok(());
            }

            let results = search_similar_chunks(
                &query_vector,
                &chunks,
                top_k.unwrap_or(config.top_k_retrieval),
            );
            println!("query: {query}");
            for (position, hit) in results.iter().enumerate() {
                println!(
                    "[{}] score={:.4} chunk={} page={}",
                    position + 1,
                    hit.score,
                    hit.chunk.chunk_index,
                    hit.chunk.page_start
                );
                println!("  {}", hit.chunk.text);
            }
        }
        Command::Chat {
            message,
            paper_id,
            no_rag,
            interactive,
        } => {
            let llm = OpenAiCompatibleClient::new(&config.llm)?;
            let mut session =
                ChatSession::new(embedder, llm, store).with_top_k(config.top_k_retrieval);
            let target = ChatTarget::new(paper_id, no_rag);

            if let Some(message) = message {
                let reply = chat_turn(&mut session, &target, &message).await;
                print_reply(&reply);
            }
            if interactive {
                info!("interactive chat; /clear resets history, /quit exits");
                let stdin = BufReader::new(io::stdin());
                let turns = run_chat_loop(&mut session, &target, stdin).await?;
                info!(turns, "chat session ended");
            }
        }
        Command::Explain { text } => {
            let llm = OpenAiCompatibleClient::new(&config.llm)?;
            let session = ChatSession::new(embedder, llm, store);
            println!("{}", session.explain_text(&text).await);
        }
        Command::Translate { text, lang } => {
            let llm = OpenAiCompatibleClient::new(&config.llm)?;
            let session = ChatSession::new(embedder, llm, store);
            println!("{}", session.translate_text(&text, &lang).await);
        }
        Command::Papers => {
            let papers = store.indexed_papers().await?;
            for paper_id in &papers {
                let chunks = store.chunks_for_paper(paper_id).await?;
                let embedded = chunks.iter().filter(|chunk| chunk.is_indexed()).count();
                println!("{paper_id} chunks={} embedded={embedded}", chunks.len());
            }
            if papers.is_empty() {
                println!("no papers indexed yet");
            }
        }
    }

    Ok(())
}

/// What each chat turn is grounded in.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ChatTarget {
    Free,
    Paper(String),
    Library,
}

impl ChatTarget {
    fn new(paper_id: Option<String>, no_rag: bool) -> Self {
        match (no_rag, paper_id) {
            (true, _) => Self::Free,
            (false, Some(paper_id)) => Self::Paper(paper_id),
            (false, None) => Self::Library,
        }
    }
}

async fn chat_turn<E, L, S>(
    session: &mut ChatSession<E, L, S>,
    target: &ChatTarget,
    message: &str,
) -> ChatReply
where
    E: Embedder,
    L: LlmClient,
    S: ChunkStore,
{
    match target {
        ChatTarget::Free => session.free_chat(message).await,
        ChatTarget::Paper(paper_id) => session.chat_with_paper(paper_id, message).await,
        ChatTarget::Library => session.chat_with_library(message).await,
    }
}

/// Sends one message per input line on the same session until EOF or `/quit`.
/// Returns the number of turns sent.
async fn run_chat_loop<E, L, S, R>(
    session: &mut ChatSession<E, L, S>,
    target: &ChatTarget,
    input: R,
) -> anyhow::Result<usize>
where
    E: Embedder,
    L: LlmClient,
    S: ChunkStore,
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    let mut turns = 0;

    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "" => continue,
            "/quit" | "/exit" => break,
            "/clear" => {
                session.clear_history();
                println!("(history cleared)");
            }
            message => {
                let reply = chat_turn(session, target, message).await;
                print_reply(&reply);
                turns += 1;
            }
        }
    }

    Ok(turns)
}

fn print_reply(reply: &ChatReply) {
    println!("{}", reply.text);
    match &reply.grounding {
        Grounding::Grounded { passages } => {
            println!();
            for (position, hit) in passages.iter().enumerate() {
                println!(
                    "  [Passage {}] page {} relevance {:.2}",
                    position + 1,
                    hit.chunk.page_start,
                    hit.score
                );
            }
        }
        Grounding::Ungrounded { reason } => {
            let note = reason.note();
            if !note.is_empty() {
                println!();
                println!("  {note}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use paperminer_core::{
        ChatMessage, ChatOptions, HashingModelLoader, InMemoryChunkStore, LlmError, Role,
    };
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct RecordingLlm {
        calls: Arc<Mutex<Vec<Vec<ChatMessage>>>>,
    }

    #[async_trait]
    impl LlmClient for RecordingLlm {
        async fn chat(
            &self,
            messages: &[ChatMessage],
            _options: ChatOptions,
        ) -> Result<String, LlmError> {
            let mut calls = self.calls.lock().unwrap();
            calls.push(messages.to_vec());
            Ok(format!("reply {}", calls.len()))
        }
    }

    fn session(
        llm: RecordingLlm,
    ) -> ChatSession<EmbeddingEngine, RecordingLlm, InMemoryChunkStore> {
        let embedder = EmbeddingEngine::local_only(Arc::new(HashingModelLoader::default()));
        ChatSession::new(embedder, llm, InMemoryChunkStore::new())
    }

    #[test]
    fn chat_target_follows_flags() {
        assert_eq!(ChatTarget::new(Some("p".to_string()), true), ChatTarget::Free);
        assert_eq!(
            ChatTarget::new(Some("p".to_string()), false),
            ChatTarget::Paper("p".to_string())
        );
        assert_eq!(ChatTarget::new(None, false), ChatTarget::Library);
    }

    #[tokio::test]
    async fn chat_loop_keeps_history_until_cleared() -> anyhow::Result<()> {
        let llm = RecordingLlm::default();
        let mut session = session(llm.clone());
        let input =
            "what is attention?\n\n  and heads?\n/clear\nfresh start\n/quit\nnever sent\n";

        let turns = run_chat_loop(&mut session, &ChatTarget::Library, input.as_bytes()).await?;

        assert_eq!(turns, 3);
        let calls = llm.calls.lock().unwrap();
        assert_eq!(calls.len(), 3);

        let second: Vec<(Role, &str)> = calls[1]
            .iter()
            .skip(1)
            .map(|message| (message.role, message.content.as_str()))
            .collect();
        assert_eq!(
            second,
            vec![
                (Role::User, "what is attention?"),
                (Role::Assistant, "reply 1"),
                (Role::User, "and heads?"),
            ]
        );

        assert_eq!(calls[2].len(), 2);
        assert_eq!(calls[2][1].content, "fresh start");
        assert_eq!(session.history().len(), 2);
        assert_eq!(session.history()[1].content, "reply 3");
        Ok(())
    }

    #[tokio::test]
    async fn chat_loop_stops_at_end_of_input() -> anyhow::Result<()> {
        let llm = RecordingLlm::default();
        let mut session = session(llm.clone());

        let turns = run_chat_loop(&mut session, &ChatTarget::Free, &b"only line"[..]).await?;

        assert_eq!(turns, 1);
        assert_eq!(session.history().len(), 2);
        Ok(())
    }
}
