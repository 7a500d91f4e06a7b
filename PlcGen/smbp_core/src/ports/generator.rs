use anyhow::Result;

/// 文本生成协作方（外部 AI 服务）
/// 说明：输出一律视为不可信文本，必须经过严格解析与结构校验。
pub trait TextGenerator {
    fn generate(&self, system: &str, prompt: &str) -> Result<String>;
}

impl<T: TextGenerator + ?Sized> TextGenerator for &T {
    fn generate(&self, system: &str, prompt: &str) -> Result<String> {
        (**self).generate(system, prompt)
    }
}
