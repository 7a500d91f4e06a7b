mod backend;
mod config;
pub mod parser;
pub mod protocol;
pub mod serializer;

// 对外导出：配置 / 编解码器 / 解析与序列化入口
pub use backend::SmbpCodec;
pub use config::SmbpConfig;
pub use parser::{parse_document, parse_lenient, LenientParse, ParseError};
pub use serializer::serialize_document;
