use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::ProjectInfo;

/// SMBP 生成/校验配置
/// 说明：文件格式常量（扩展名、控制器型号）由调用方给出，核心逻辑不自行推断。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SmbpConfig {
    /// 目标控制器型号
    pub controller: String,
    /// 输出文件扩展名
    pub file_extension: String,
    pub project_name: String,
    pub project_path: String,
    pub pou_name: String,
    pub project_version: String,
    /// 空字段（Descriptor/ElementType/Symbol）超过该数量时给出警告
    pub max_empty_fields: usize,
    /// 真值表穷举的变量上限
    pub equivalence_var_limit: usize,
    /// 未提供期望逻辑时，是否请生成器根据需求给出一份
    pub derive_expected_logic: bool,
}

impl SmbpConfig {
    /// 默认 M221 配置
    pub fn m221() -> Self {
        Self {
            controller: "TM221CE24T".to_string(),
            file_extension: ".smbp".to_string(),
            project_name: "Project".to_string(),
            project_path: String::new(),
            pou_name: "Main".to_string(),
            project_version: "1.0".to_string(),
            max_empty_fields: 5,
            equivalence_var_limit: 16,
            derive_expected_logic: false,
        }
    }

    /// 指定控制器型号，其余取默认值
    pub fn new(controller: impl Into<String>) -> Self {
        Self {
            controller: controller.into(),
            ..Self::m221()
        }
    }

    /// 从 JSON 文件加载；文件不存在时返回默认配置
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read SMBP config file from: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse SMBP config JSON from: {}", path.display()))?;
        Ok(config)
    }

    pub fn project_info(&self) -> ProjectInfo {
        let path = if self.project_path.is_empty() {
            format!("{}{}", self.project_name, self.file_extension)
        } else {
            self.project_path.clone()
        };
        ProjectInfo {
            name: self.project_name.clone(),
            path,
            version: self.project_version.clone(),
            pou_name: self.pou_name.clone(),
        }
    }
}

impl Default for SmbpConfig {
    fn default() -> Self {
        Self::m221()
    }
}
