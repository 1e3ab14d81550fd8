//! Answer orchestration.
//!
//! One query runs catalog lookup -> index materialization -> similarity
//! search -> page normalization -> chat completion, and hands the boundary
//! a metadata record plus a channel of content fragments. Retrieval
//! problems (no index, corrupt artifacts, embedding failure) degrade to the
//! fixed no-context answer instead of failing the request; only an unknown
//! document id is an error to the caller.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::catalog::CatalogService;
use crate::citations::normalize_pages;
use crate::core::errors::ApiError;
use crate::llm::{ChatMessage, ChatRequest, LlmProvider};
use crate::vectorstore::{RetrievedChunk, VectorstoreManager};


/// Emitted before any content; tells the UI which pages to cite and where
/// to open the PDF viewer.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerMeta {
    pub pages: Vec<u32>,
    pub pdf_url: String,
    pub first_page: u32,
    pub doc_label: String,
}

pub const NO_CONTEXT_ANSWER: &str = "I couldn't find relevant information in this document.";

pub struct AnswerService {
    catalog: Arc<CatalogService>,
    vectorstores: Arc<VectorstoreManager>,
    llm: Arc<dyn LlmProvider>,
    top_k: usize,
    shift_zero_based: bool,
}

impl AnswerService {
    pub fn new(
        catalog: Arc<CatalogService>,
        vectorstores: Arc<VectorstoreManager>,
        llm: Arc<dyn LlmProvider>,
        top_k: usize,
        shift_zero_based: bool,
    ) -> Self {
        Self {
            catalog,
            vectorstores,
            llm,
            top_k,
            shift_zero_based,
        }
    }

    /// Answer `question` against `doc_id`.
    ///
    /// Returns the metadata record and a channel of content fragments. In
    /// streaming mode the channel carries model fragments as they arrive; in
    /// whole-response mode it carries a single item. A model failure arrives
    /// on the channel as `ApiError::AnswerGeneration`; by then the metadata
    /// has typically already been written to the wire, so the boundary ends
    /// the content stream early instead of retrying.
    pub async fn answer(
        &self,
        doc_id: &str,
        question: &str,
        streaming: bool,
    ) -> Result<(AnswerMeta, mpsc::Receiver<Result<String, ApiError>>), ApiError> {
        let doc = self
            .catalog
            .doc_info(doc_id)
            .await
            .ok_or_else(|| ApiError::UnknownDocument(doc_id.to_string()))?;
        let pdf_url = format!("/pdf/{}", doc.pdf_rel_path);

        let chunks = self.retrieve(doc_id, question).await;
        if chunks.is_empty() {
            let meta = AnswerMeta {
                pages: Vec::new(),
                pdf_url,
                first_page: 1,
                doc_label: doc.label,
            };
            return Ok((meta, fixed_answer_channel()));
        }

        let citations = normalize_pages(&chunks, self.shift_zero_based);
        let meta = AnswerMeta {
            pages: citations.pages,
            pdf_url,
            first_page: citations.first_page,
            doc_label: doc.label,
        };

        let context = chunks
            .iter()
            .map(|chunk| chunk.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let request = build_request(&context, question);

        let rx = if streaming {
            self.spawn_streamed(request)
        } else {
            self.spawn_whole(request)
        };

        Ok((meta, rx))
    }

    /// Retrieval with availability-preserving degradation: everything that
    /// can go wrong here is logged and collapses to "no chunks".
    async fn retrieve(&self, doc_id: &str, question: &str) -> Vec<RetrievedChunk> {
        let index = match self.vectorstores.get_index(doc_id).await {
            Ok(Some(index)) => index,
            Ok(None) => return Vec::new(),
            Err(e) => {
                tracing::error!("index for '{}' unusable: {}", doc_id, e);
                return Vec::new();
            }
        };

        let embeddings = match self.llm.embed(&[question.to_string()]).await {
            Ok(embeddings) => embeddings,
            Err(e) => {
                tracing::error!("embedding question for '{}' failed: {}", doc_id, e);
                return Vec::new();
            }
        };
        let Some(query) = embeddings.first() else {
            return Vec::new();
        };

        match index.search(query, self.top_k) {
            Ok(chunks) => chunks,
            Err(e) => {
                tracing::error!("search in '{}' failed: {}", doc_id, e);
                Vec::new()
            }
        }
    }

    fn spawn_streamed(&self, request: ChatRequest) -> mpsc::Receiver<Result<String, ApiError>> {
        let llm = self.llm.clone();
        let (tx, rx) = mpsc::channel(32);

        tokio::spawn(async move {
            let mut inner = match llm.stream_chat(request).await {
                Ok(inner) => inner,
                Err(e) => {
                    let _ = tx
                        .send(Err(ApiError::AnswerGeneration(e.to_string())))
                        .await;
                    return;
                }
            };

            while let Some(item) = inner.recv().await {
                let item = item.map_err(|e| ApiError::AnswerGeneration(e.to_string()));
                let failed = item.is_err();
                if tx.send(item).await.is_err() || failed {
                    // Receiver gone (client disconnect) or the model died;
                    // dropping `inner` closes the upstream invocation.
                    return;
                }
            }
        });

        rx
    }

    fn spawn_whole(&self, request: ChatRequest) -> mpsc::Receiver<Result<String, ApiError>> {
        let llm = self.llm.clone();
        let (tx, rx) = mpsc::channel(1);

        tokio::spawn(async move {
            let result = llm
                .chat(request)
                .await
                .map_err(|e| ApiError::AnswerGeneration(e.to_string()));
            let _ = tx.send(result).await;
        });

        rx
    }
}

fn fixed_answer_channel() -> mpsc::Receiver<Result<String, ApiError>> {
    let (tx, rx) = mpsc::channel(1);
    // Buffered send cannot fail on a fresh channel of capacity 1.
    let _ = tx.try_send(Ok(NO_CONTEXT_ANSWER.to_string()));
    rx
}

fn build_request(context: &str, question: &str) -> ChatRequest {
    let system = "You are an assistant answering questions about engineering and construction codes.\n\
                  Use ONLY the information in the provided context.\n\
                  If the answer is not clearly contained in the context, say you don't know.";
    let user = format!("Context:\n{}\n\nQuestion:\n{}", context, question);
    ChatRequest::new(vec![ChatMessage::system(system), ChatMessage::user(user)])
}
