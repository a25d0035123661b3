//! # commsdsl — CommsDSL schema front end and semantic analyzer
//!
//! Parses CommsDSL schema documents (an XML dialect describing binary
//! communication protocols), validates them, resolves references between
//! elements and schemas, and exposes the result as a read-only semantic tree
//! for code generators.
//!
//! ## Schema structure
//!
//! - **Schema**: name, protocol version, DSL version, default endianness
//! - **Namespaces**: nested, each holding fields, messages, frames and interfaces
//! - **Fields**: `int`, `enum`, `set`, `data`, `string`, `bitfield`, `bundle`,
//!   `list`, `ref`, `optional`, `variant`
//! - **Frames**: ordered layers `sync`, `size`, `id`, `value`, `payload`,
//!   `checksum`, `custom`
//!
//! ## Example schema
//!
//! ```text
//! <schema name="demo" version="2" endian="big">
//!   <fields>
//!     <enum name="MsgId" type="uint8" semanticType="messageId">
//!       <validValue name="Ping" val="1" />
//!     </enum>
//!   </fields>
//!   <message name="Ping" id="MsgId.Ping">
//!     <int name="Seq" type="uint16" />
//!   </message>
//!   <frame name="Frame">
//!     <size name="Size"><int name="SizeField" type="uint16" /></size>
//!     <id name="Id" field="MsgId" />
//!     <payload name="Data" />
//!   </frame>
//! </schema>
//! ```
//!
//! ## Usage
//!
//! [`Protocol`] parses and validates documents; [`Generator`] wraps a
//! validated protocol into the semantic tree, preparing referenced elements.
//! See `tests/generator.rs` for complete examples.

pub mod alias;
pub mod common;
pub mod diag;
pub mod dump;
pub mod error;
pub mod field;
pub mod frame;
pub mod gen;
pub mod interface;
pub mod layer;
pub mod message;
pub mod namespace;
pub mod props;
pub mod protocol;
pub mod registry;
pub mod schema;
pub mod units;
pub mod version;
pub mod xml;

pub use diag::{Diagnostic, Logger, LoggerConfig, Severity};
pub use error::{DslError, DslResult};
pub use field::{Field, Kind, SemanticType};
pub use frame::Frame;
pub use gen::{load_protocol, GenConfig, GenState, Generator};
pub use interface::Interface;
pub use layer::{Layer, LayerKind};
pub use message::Message;
pub use namespace::Namespace;
pub use protocol::{Protocol, ProtocolConfig};
pub use registry::{FieldId, FrameId, InterfaceId, MessageId, NamespaceId, Registry, SchemaId};
pub use schema::Schema;
pub use version::{does_element_exist, is_element_optional, VersionWindow};
