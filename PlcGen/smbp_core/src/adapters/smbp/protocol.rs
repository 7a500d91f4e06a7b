/*
SMBP 文本格式约定（Machine Expert Basic 工程文件）
*/

/// 目标工具要求的 UTF-8 BOM
pub const BOM: char = '\u{feff}';
/// 行尾必须是 CRLF
pub const LINE_ENDING: &str = "\r\n";
pub const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="utf-8"?>"#;

pub const ROOT: &str = "ProjectDescriptor";
pub const ROOT_NAMESPACES: [(&str, &str); 2] = [
    ("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance"),
    ("xmlns:xsd", "http://www.w3.org/2001/XMLSchema"),
];

pub const PROJECT_VERSION: &str = "ProjectVersion";
pub const NAME: &str = "Name";
pub const FULL_PATH: &str = "FullPath";
pub const HARDWARE_CONFIGURATION: &str = "HardwareConfiguration";
pub const PLC: &str = "Plc";
pub const REFERENCE: &str = "Reference";
pub const SOFTWARE_CONFIGURATION: &str = "SoftwareConfiguration";
pub const POUS: &str = "Pous";
pub const POU: &str = "ProgramOrganizationUnits";
pub const SECTION_NUMBER: &str = "SectionNumber";

// 梯级结构
pub const RUNGS: &str = "Rungs";
pub const RUNG_ENTITY: &str = "RungEntity";
pub const LADDER_ELEMENTS: &str = "LadderElements";
pub const LADDER_ENTITY: &str = "LadderEntity";
pub const ELEMENT_TYPE: &str = "ElementType";
pub const DESCRIPTOR: &str = "Descriptor";
pub const COMMENT: &str = "Comment";
pub const SYMBOL: &str = "Symbol";
pub const ROW: &str = "Row";
pub const COLUMN: &str = "Column";
pub const CHOSEN_CONNECTION: &str = "ChosenConnection";
pub const INSTRUCTION_LINES: &str = "InstructionLines";
pub const INSTRUCTION_LINE_ENTITY: &str = "InstructionLineEntity";
pub const INSTRUCTION_LINE: &str = "InstructionLine";
pub const MAIN_COMMENT: &str = "MainComment";
pub const LABEL: &str = "Label";
pub const IS_LADDER_SELECTED: &str = "IsLadderSelected";

// 声明表
pub const ADDRESS: &str = "Address";
pub const INDEX: &str = "Index";
pub const IS_USED: &str = "IsUsed";
pub const PRESET: &str = "Preset";
pub const BASE: &str = "Base";
pub const TIMER_TYPE: &str = "TimerType";
pub const SYMBOL_TABLE: &str = "SymbolTable";
pub const SYMBOL_ENTRY: &str = "SymbolEntry";

/// 按输出顺序排列的声明段：(段标签, 条目标签)，与 `AddressKind::ALL` 一一对应
pub const DECLARATION_SECTIONS: [(&str, &str); 9] = [
    ("DigitalInputs", "DigitalInput"),
    ("DigitalOutputs", "DigitalOutput"),
    ("AnalogInputs", "AnalogInput"),
    ("AnalogOutputs", "AnalogOutput"),
    ("MemoryBits", "MemoryBit"),
    ("MemoryWords", "MemoryWord"),
    ("MemoryFloats", "MemoryFloat"),
    ("Timers", "TimerTM"),
    ("Counters", "Counter"),
];

/// 需要开闭标签数量一致的结构标签
pub const BALANCED_TAGS: [&str; 3] = [RUNGS, RUNG_ENTITY, INSTRUCTION_LINE_ENTITY];

/// 常见的结构标签拼写错误 → 正确标签
pub const TAG_TYPOS: [(&str, &str); 12] = [
    ("RungEntry", RUNG_ENTITY),
    ("Rung", RUNG_ENTITY),
    ("InstructionLineEntry", INSTRUCTION_LINE_ENTITY),
    ("InstructionsLines", INSTRUCTION_LINES),
    ("LadderEntry", LADDER_ENTITY),
    ("LadderElement", LADDER_ENTITY),
    ("ChoosenConnection", CHOSEN_CONNECTION),
    ("ElementTyp", ELEMENT_TYPE),
    ("Discriptor", DESCRIPTOR),
    ("Descripter", DESCRIPTOR),
    ("IsLadderSelect", IS_LADDER_SELECTED),
    ("MainComent", MAIN_COMMENT),
];

/// 拼写错误的标签名 → 正确标签名
pub fn correct_tag(name: &str) -> Option<&'static str> {
    TAG_TYPOS
        .iter()
        .find(|(typo, _)| *typo == name)
        .map(|(_, correct)| *correct)
}
