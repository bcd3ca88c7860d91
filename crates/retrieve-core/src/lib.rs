//! Hybrid dense+BM25 document retrieval: local persistence, RRF fusion, and
//! a structured request surface (§6.1 of the design document this crate
//! implements).
//!
//! The entry point is [`handle::RetrieveHandle`]: open one per process and
//! drive every operation (`put_document`, `search`, `delete_document`,
//! `get_documents_by_prefix`) through the functions in [`request`].
//!
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use retrieve_core::handle::RetrieveHandle;
//! use retrieve_core::request::{self, SearchArgs};
//!
//! let handle = RetrieveHandle::open(None).await?;
//! request::put_document(&handle, "hello world", "/a.md", None, false).await;
//! let args = SearchArgs {
//!     query: "hello",
//!     top_k: 5,
//!     file_type: None,
//!     include_documents: true,
//!     max_content_length: None,
//!     min_score: None,
//!     filepath_prefix: None,
//! };
//! request::search(&handle, args).await;
//! # Ok(())
//! # }
//! ```

pub mod bm25;
pub mod dense;
pub mod embedder;
pub mod handle;
pub mod hybrid;
pub mod ingest;
pub mod request;
pub mod sparse;
pub mod tokenizer;
pub mod vector_store;
