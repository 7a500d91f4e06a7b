use anyhow::{Context, Result};

use crate::domain::Document;
use crate::ports::backend::DocumentCodec;

use super::config::SmbpConfig;
use super::protocol::BOM;
use super::serializer::serialize_document;

/// SMBP 编解码器：文档模型与 .smbp 文本互转
#[derive(Debug, Clone, Default)]
pub struct SmbpCodec {
    config: SmbpConfig,
}

impl SmbpCodec {
    /// 使用指定配置创建编解码器
    pub fn new(config: SmbpConfig) -> Self {
        Self { config }
    }

    /// 快捷构建：M221 默认配置
    pub fn m221() -> Self {
        Self::new(SmbpConfig::m221())
    }

    /// 只读访问配置（便于上层做诊断）
    pub fn config(&self) -> &SmbpConfig {
        &self.config
    }
}

impl DocumentCodec for SmbpCodec {
    /// 解码入口：BOM 可有可无，必须是合法 UTF-8
    fn decode(&self, data: &[u8]) -> Result<Document> {
        let text = std::str::from_utf8(data).context("SMBP file is not valid UTF-8")?;
        let document = super::parser::parse_document(text)
            .with_context(|| format!("failed to parse SMBP document ({} bytes)", data.len()))?;
        Ok(document)
    }

    /// 编码入口：输出带 BOM 的 UTF-8 文本
    fn encode(&self, document: &Document) -> Result<Vec<u8>> {
        let text = serialize_document(document);
        debug_assert!(text.starts_with(BOM));
        Ok(text.into_bytes())
    }

    fn file_extension(&self) -> &str {
        &self.config.file_extension
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::builder::build_simple_rung;
    use crate::application::assembler::assemble;

    #[test]
    fn encodes_with_bom_and_decodes_back() {
        let rung = build_simple_rung("%I0.0".parse().unwrap(), "%Q0.0".parse().unwrap(), false).unwrap();
        let document = assemble("TM221CE24T", vec![rung], Vec::new()).unwrap();
        let codec = SmbpCodec::m221();

        let bytes = codec.encode(&document).unwrap();
        assert_eq!(&bytes[..3], &[0xEF, 0xBB, 0xBF]);
        assert_eq!(codec.decode(&bytes).unwrap().rungs(), document.rungs());
        assert_eq!(codec.file_extension(), ".smbp");
    }

    #[test]
    fn rejects_non_utf8_bytes() {
        let err = SmbpCodec::m221().decode(&[0xff, 0xfe, 0x00]).unwrap_err();
        assert!(err.to_string().contains("UTF-8"));
    }
}
