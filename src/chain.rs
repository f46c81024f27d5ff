//! Retrieval-augmented generation chains.
//!
//! A [`RagChain`] ties the vector index to an LLM provider behind a persona
//! prompt. Invoking it retrieves the top-k chunks for the question, renders
//! them into the persona template, and asks the configured model.
//!
//! Two personas exist. The general one answers strictly from the retrieved
//! context. The specialized one ("Delia") is an EDSL scripting assistant: it
//! tags and validates EDSL code blocks in the generated answer, adapts its
//! tone to the caller's experience level, and never propagates errors — a
//! failed generation turns into a structured answer carrying an apology and
//! the error text.

use std::sync::Arc;

use crate::config::{Config, LlmConfig};
use crate::error::Result;
use crate::index::VectorIndex;
use crate::llm::{self, LlmProvider};
use crate::models::{DeliaAnswer, UserLevel};
use crate::validator;

/// Which system prompt and answer shape a chain uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Persona {
    General,
    Specialized,
}

const GENERAL_PROMPT: &str = "\
Answer the question based only on the following context:

{context}

Question: {question}

Answer in the original language of the question.";

const DELIA_PROMPT: &str = "\
Eres Delia, una asistente experta en el lenguaje de scripting EDSL. Ayudas a \
desarrolladores a escribir, entender y depurar scripts EDSL.

Adapta tu respuesta al nivel del usuario indicado al inicio de la pregunta \
(basico, intermedio o avanzado): explica paso a paso para un nivel basico, \
se concisa y tecnica para un nivel avanzado.

Si la pregunta incluye bloques de codigo EDSL, revisalos y comenta cualquier \
problema que encuentres. Cuando muestres codigo EDSL en tu respuesta, usa \
bloques cercados con ```edsl. Responde unicamente con base en el siguiente \
contexto:

{context}

Pregunta: {question}

Responde en el idioma original de la pregunta.";

const DELIA_APOLOGY: &str =
    "Lo siento, ocurrio un error al procesar tu consulta. Por favor intenta de nuevo.";

/// The answer Delia gives when the pipeline itself could not run (e.g. the
/// chain failed to build). Used wherever an error must become an answer.
pub fn delia_failure(level: UserLevel, error: String) -> DeliaAnswer {
    DeliaAnswer {
        response: DELIA_APOLOGY.to_string(),
        validation_results: Vec::new(),
        user_level: level.as_str().to_string(),
        has_edsl_code: false,
        edsl_block_count: 0,
        error: Some(error),
    }
}

pub struct RagChain {
    prompt: &'static str,
    index: Arc<VectorIndex>,
    provider: Box<dyn LlmProvider>,
    llm_config: LlmConfig,
    top_k: usize,
}

impl RagChain {
    /// Build a chain for `persona`. Fails if the LLM provider is
    /// misconfigured; no network traffic happens here.
    pub fn build(config: &Config, persona: Persona, index: Arc<VectorIndex>) -> Result<RagChain> {
        let provider = llm::create_provider(&config.llm)?;
        Ok(RagChain {
            prompt: match persona {
                Persona::General => GENERAL_PROMPT,
                Persona::Specialized => DELIA_PROMPT,
            },
            index,
            provider,
            llm_config: config.llm.clone(),
            top_k: config.retrieval.top_k,
        })
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    /// Retrieve, render, generate. The raw pipeline shared by both personas.
    pub async fn invoke(&self, question: &str) -> Result<String> {
        let records = self.index.query(question, self.top_k).await?;
        let context = records
            .iter()
            .map(|r| r.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let prompt = self
            .prompt
            .replace("{context}", &context)
            .replace("{question}", question);

        let answer = llm::generate(self.provider.as_ref(), &self.llm_config, &prompt).await?;
        Ok(answer.trim().to_string())
    }

    /// Answer with the general persona. Errors propagate to the caller.
    pub async fn ask_general(&self, question: &str) -> Result<String> {
        self.invoke(question).await
    }

    /// Answer with the specialized persona.
    ///
    /// The generated answer is post-processed: untagged fenced blocks are
    /// rewritten to ```` ```edsl ````, every EDSL block is validated, and the
    /// code-presence fields describe the answer. This is also a containment
    /// boundary: any retrieval or generation failure is folded into the
    /// answer instead of being returned — the caller always gets a
    /// [`DeliaAnswer`], with empty validation fields on failure.
    pub async fn ask_delia(&self, question: &str, level: UserLevel) -> DeliaAnswer {
        let prefixed = format!("[nivel: {}] {}", level.tag(), question);

        match self.invoke(&prefixed).await {
            Ok(response) => {
                let tagged = validator::tag_untagged_blocks(&response);
                let blocks = validator::extract_edsl_blocks(&tagged);
                let validation_results: Vec<_> =
                    blocks.iter().map(|b| validator::validate_block(b)).collect();

                DeliaAnswer {
                    has_edsl_code: !blocks.is_empty(),
                    edsl_block_count: blocks.len(),
                    response: tagged,
                    validation_results,
                    user_level: level.as_str().to_string(),
                    error: None,
                }
            }
            Err(e) => delia_failure(level, e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, DbConfig};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn test_config(dir: &std::path::Path) -> Config {
        Config {
            db: DbConfig {
                path: dir.join("ragdesk.sqlite"),
            },
            llm: Default::default(),
            embedding: Default::default(),
            chunking: Default::default(),
            retrieval: Default::default(),
            server: Default::default(),
        }
    }

    #[test]
    fn templates_carry_both_slots() {
        for prompt in [GENERAL_PROMPT, DELIA_PROMPT] {
            assert!(prompt.contains("{context}"));
            assert!(prompt.contains("{question}"));
        }
    }

    #[tokio::test]
    async fn build_fails_on_unknown_llm_provider() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut config = test_config(tmp.path());
        config.llm.provider = "mistral".to_string();
        let index = Arc::new(VectorIndex::connect(&config).await.unwrap());

        assert!(RagChain::build(&config, Persona::General, index).is_err());
    }

    /// A single-purpose Ollama stand-in: answers `/api/embeddings` with a
    /// fixed vector and `/api/generate` with the given text. Listens on an
    /// ephemeral port; returns the base URL.
    async fn spawn_stub_ollama(generation: &'static str) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(async move {
                    let mut buf = Vec::new();
                    let mut tmp = [0u8; 1024];

                    // Read the request head, then drain the body so the
                    // client sees a clean exchange.
                    let (path, mut remaining) = loop {
                        let Ok(n) = stream.read(&mut tmp).await else {
                            return;
                        };
                        if n == 0 {
                            return;
                        }
                        buf.extend_from_slice(&tmp[..n]);
                        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                            let head = String::from_utf8_lossy(&buf[..pos]).to_string();
                            let path = head
                                .lines()
                                .next()
                                .and_then(|l| l.split_whitespace().nth(1))
                                .unwrap_or("/")
                                .to_string();
                            let content_length = head
                                .lines()
                                .find_map(|l| {
                                    let (name, value) = l.split_once(':')?;
                                    name.eq_ignore_ascii_case("content-length")
                                        .then(|| value.trim().parse::<usize>().ok())?
                                })
                                .unwrap_or(0);
                            let body_read = buf.len() - pos - 4;
                            break (path, content_length.saturating_sub(body_read));
                        }
                    };
                    while remaining > 0 {
                        let Ok(n) = stream.read(&mut tmp).await else {
                            return;
                        };
                        if n == 0 {
                            break;
                        }
                        remaining = remaining.saturating_sub(n);
                    }

                    let body = if path.ends_with("/api/generate") {
                        serde_json::json!({ "response": generation }).to_string()
                    } else {
                        serde_json::json!({ "embedding": [1.0, 0.0, 0.0] }).to_string()
                    };
                    let response = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\
                         Content-Length: {}\r\nConnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = stream.write_all(response.as_bytes()).await;
                    let _ = stream.shutdown().await;
                });
            }
        });

        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn delia_tags_and_validates_code_in_the_answer() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut config = test_config(tmp.path());
        // The model answers a code-free question with an untagged block.
        let base_url =
            spawn_stub_ollama("Claro, aqui tienes:\n```\nSET x = 1\n```").await;
        config.llm.ollama_base_url = base_url.clone();
        config.llm.max_retries = 0;
        config.embedding.ollama_base_url = base_url;
        config.embedding.max_retries = 0;

        let index = Arc::new(VectorIndex::connect(&config).await.unwrap());
        let chain = RagChain::build(&config, Persona::Specialized, index).unwrap();

        let answer = chain
            .ask_delia("Como asigno una variable?", UserLevel::Intermediate)
            .await;

        assert!(answer.error.is_none(), "error: {:?}", answer.error);
        // The untagged fence in the model output comes back tagged.
        assert!(
            answer.response.contains("```edsl\nSET x = 1\n```"),
            "response: {}",
            answer.response
        );
        assert!(answer.has_edsl_code);
        assert_eq!(answer.edsl_block_count, 1);
        assert_eq!(answer.validation_results.len(), 1);
        // `SET x = 1` has no terminator, so the advisory check fires.
        assert_eq!(answer.validation_results[0].warnings.len(), 1);
        assert!(answer.validation_results[0].is_valid);
    }

    #[tokio::test]
    async fn delia_answer_without_code_reports_none() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut config = test_config(tmp.path());
        let base_url = spawn_stub_ollama("Una variable guarda un valor.").await;
        config.llm.ollama_base_url = base_url.clone();
        config.embedding.ollama_base_url = base_url;

        let index = Arc::new(VectorIndex::connect(&config).await.unwrap());
        let chain = RagChain::build(&config, Persona::Specialized, index).unwrap();

        let answer = chain
            .ask_delia("Que es una variable?", UserLevel::Basic)
            .await;

        assert!(answer.error.is_none());
        assert_eq!(answer.response, "Una variable guarda un valor.");
        assert!(!answer.has_edsl_code);
        assert_eq!(answer.edsl_block_count, 0);
        assert!(answer.validation_results.is_empty());
    }

    #[tokio::test]
    async fn delia_contains_generation_failures() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut config = test_config(tmp.path());
        // Unroutable address so the generation call fails fast without
        // retry-looping for the full test run.
        config.llm.ollama_base_url = "http://127.0.0.1:1".to_string();
        config.llm.max_retries = 0;
        config.llm.timeout_secs = 1;
        config.embedding.ollama_base_url = "http://127.0.0.1:1".to_string();
        config.embedding.max_retries = 0;
        config.embedding.timeout_secs = 1;

        let index = Arc::new(VectorIndex::connect(&config).await.unwrap());
        let chain = RagChain::build(&config, Persona::Specialized, index).unwrap();

        let question = "Revisa este codigo EDSL:\n```\nIF x > 10 THEN y = 20\n```";
        let answer = chain.ask_delia(question, UserLevel::Basic).await;

        assert_eq!(answer.response, DELIA_APOLOGY);
        assert!(answer.error.is_some());
        assert_eq!(answer.user_level, "basic");
        // No answer was generated, so the code fields describe nothing.
        assert!(!answer.has_edsl_code);
        assert_eq!(answer.edsl_block_count, 0);
        assert!(answer.validation_results.is_empty());
    }
}
