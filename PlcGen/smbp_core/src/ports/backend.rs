use anyhow::Result;

use crate::domain::Document;

/// 文档编解码端口接口
/// 说明：crate 仅负责“解析/序列化”，文件读写与下载由上层处理。
pub trait DocumentCodec {
    /// 解码：将文件字节解析为文档模型
    fn decode(&self, data: &[u8]) -> Result<Document>;
    /// 编码：将文档模型序列化为文件字节
    fn encode(&self, document: &Document) -> Result<Vec<u8>>;
    /// 输出文件扩展名
    /// e.g. ".smbp"
    fn file_extension(&self) -> &str;
}
