//! Weft Config
//!
//! This crate contains the tabular workflow definition types for weft and the
//! parser that produces them. A workflow table is a CSV document where every
//! row describes one node of one workflow:
//!
//! ```text
//! workflow_name,node_name,agent_type,input_fields,output_field,success_next
//! TestGraph,start,echo,input_data,start_out,end
//! TestGraph,end,echo,start_out,end_out,
//! ```
//!
//! Header cells are matched case-insensitively and through documented aliases
//! (see [`Column`]), so `workflow_name`, `WORKFLOW_NAME` and `GraphName` all
//! resolve to the same logical field.
//!
//! The parser does not resolve anything: it produces a [`GraphSpec`] grouped
//! by workflow name, preserving row order. Graph construction happens in
//! `weft-workflow`.

mod columns;
mod csv;
mod error;
mod node;
mod parser;
mod spec;

pub use columns::{Column, HeaderMap, normalize_header};
pub use error::{ParseError, ParseWarning};
pub use node::{DEFAULT_AGENT_TYPE, NodeSpec, parse_context};
pub use parser::{parse, parse_file};
pub use spec::{GraphSpec, WorkflowSpec};
