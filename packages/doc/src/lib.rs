pub mod archive;
pub mod combiner;
pub mod control;
pub mod convert;
pub mod document;
pub mod editor_state;
pub mod entropy;
pub mod error;
pub mod splitter;
pub mod templates;

pub use archive::{archive_layout, source_layout, Archive, SourceTree};
pub use combiner::{combine_control, CombineContext};
pub use control::{
    ControlRecord, CustomPropertyRecord, DataSourceRecord, DynamicPropertyRecord, RuleRecord,
    ScopeRuleRecord, TemplateRecord, FUNCTION_PROPERTY_KIND, GROUP_TEMPLATE,
};
pub use convert::{pack, unpack, Packed, Unpacked};
pub use document::{Manifest, SourceDocument};
pub use editor_state::{ControlState, EditorStateStore, PropertyState, TopParentState};
pub use entropy::Entropy;
pub use error::{DocError, DocResult};
pub use splitter::{split_control, SplitContext};
pub use templates::TemplateStore;
