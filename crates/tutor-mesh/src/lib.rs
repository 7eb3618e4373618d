pub mod convert;
pub mod document;
pub mod export;
pub mod workspace;

pub use convert::{
    CommandLine, ConversionOutput, ConvertError, Converter, read_document, write_document,
};
pub use document::{DocumentError, MeshObject, QuestionDocument, QuestionInfo};
pub use export::{parse_obj, to_obj};
pub use workspace::{ConversionJob, Workspace};
