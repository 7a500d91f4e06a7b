/*
SMBP 文本序列化
*/
use std::fmt::Display;

use log::debug;
use quick_xml::escape::escape;

use super::protocol::*;
use crate::domain::{AddressKind, Declaration, DeclarationSettings, Document, Element, Rung};

/// 辅助类：处理 SMBP 的缩进、CRLF 行尾与转义规则
struct SmbpWriter {
    out: String,
    depth: usize,
}

impl SmbpWriter {
    fn new() -> Self {
        Self {
            out: String::new(),
            depth: 0,
        }
    }

    fn into_inner(self) -> String {
        self.out
    }

    fn line(&mut self, text: &str) {
        for _ in 0..self.depth {
            self.out.push_str("  ");
        }
        self.out.push_str(text);
        self.out.push_str(LINE_ENDING);
    }

    fn open(&mut self, tag: &str) {
        self.line(&format!("<{tag}>"));
        self.depth += 1;
    }

    fn open_with(&mut self, tag: &str, attributes: &[(&str, &str)]) {
        let attrs: String = attributes
            .iter()
            .map(|(k, v)| format!(" {k}=\"{}\"", escape(v)))
            .collect();
        self.line(&format!("<{tag}{attrs}>"));
        self.depth += 1;
    }

    fn close(&mut self, tag: &str) {
        self.depth = self.depth.saturating_sub(1);
        self.line(&format!("</{tag}>"));
    }

    fn empty(&mut self, tag: &str) {
        self.line(&format!("<{tag} />"));
    }

    /// 文本字段；空值写成自闭合标签
    fn field(&mut self, tag: &str, value: impl Display) {
        let text = value.to_string();
        if text.is_empty() {
            self.empty(tag);
        } else {
            self.line(&format!("<{tag}>{}</{tag}>", escape(&text)));
        }
    }

    /// 可省略字段：空值时整个标签不输出
    fn optional_field(&mut self, tag: &str, value: Option<&str>) {
        if let Some(text) = value.filter(|t| !t.is_empty()) {
            self.field(tag, text);
        }
    }
}

/// 主入口：文档 → SMBP 文本（含 BOM，CRLF 行尾）
pub fn serialize_document(document: &Document) -> String {
    let mut writer = SmbpWriter::new();
    writer.out.push(BOM);
    writer.line(XML_DECLARATION);
    writer.open_with(ROOT, &ROOT_NAMESPACES);

    let project = document.project();
    writer.field(PROJECT_VERSION, &project.version);
    writer.field(NAME, &project.name);
    writer.field(FULL_PATH, &project.path);

    writer.open(HARDWARE_CONFIGURATION);
    writer.open(PLC);
    writer.field(REFERENCE, document.controller());
    writer.close(PLC);
    writer.close(HARDWARE_CONFIGURATION);

    writer.open(SOFTWARE_CONFIGURATION);
    writer.open(POUS);
    writer.open(POU);
    writer.field(NAME, &project.pou_name);
    writer.field(SECTION_NUMBER, 0);
    writer.open(RUNGS);
    for rung in document.rungs() {
        write_rung(&mut writer, rung);
    }
    writer.close(RUNGS);
    writer.close(POU);
    writer.close(POUS);

    for (kind, (section, item)) in AddressKind::ALL.iter().zip(DECLARATION_SECTIONS) {
        let entries: Vec<&Declaration> = document.declarations().of_kind(*kind).collect();
        if entries.is_empty() {
            writer.empty(section);
            continue;
        }
        writer.open(section);
        for declaration in entries {
            write_declaration(&mut writer, item, declaration);
        }
        writer.close(section);
    }

    let symbols: Vec<_> = document.declarations().symbols().collect();
    if symbols.is_empty() {
        writer.empty(SYMBOL_TABLE);
    } else {
        writer.open(SYMBOL_TABLE);
        for (symbol, address) in symbols {
            writer.open(SYMBOL_ENTRY);
            writer.field(NAME, symbol);
            writer.field(ADDRESS, address);
            writer.close(SYMBOL_ENTRY);
        }
        writer.close(SYMBOL_TABLE);
    }

    writer.close(SOFTWARE_CONFIGURATION);
    writer.close(ROOT);

    let text = writer.into_inner();
    debug!(
        "serialized document '{}': {} rungs, {} bytes",
        project.name,
        document.rungs().len(),
        text.len()
    );
    text
}

fn write_rung(writer: &mut SmbpWriter, rung: &Rung) {
    writer.open(RUNG_ENTITY);

    writer.open(LADDER_ELEMENTS);
    for element in rung.elements() {
        write_element(writer, element);
    }
    writer.close(LADDER_ELEMENTS);

    writer.open(INSTRUCTION_LINES);
    for instruction in rung.instructions() {
        writer.open(INSTRUCTION_LINE_ENTITY);
        writer.field(INSTRUCTION_LINE, instruction);
        writer.field(COMMENT, &instruction.comment);
        writer.close(INSTRUCTION_LINE_ENTITY);
    }
    writer.close(INSTRUCTION_LINES);

    writer.field(NAME, rung.name());
    writer.field(MAIN_COMMENT, rung.comment());
    writer.empty(LABEL);
    writer.field(IS_LADDER_SELECTED, rung.is_ladder_selected());
    writer.close(RUNG_ENTITY);
}

fn write_element(writer: &mut SmbpWriter, element: &Element) {
    let position = element.position();
    writer.open(LADDER_ENTITY);
    writer.field(ELEMENT_TYPE, element.kind().as_str());
    // 连线没有描述符
    writer.optional_field(DESCRIPTOR, element.operand().descriptor().as_deref());
    writer.field(COMMENT, element.comment());
    writer.optional_field(SYMBOL, element.symbol());
    writer.field(ROW, position.row);
    writer.field(COLUMN, position.column);
    writer.field(CHOSEN_CONNECTION, element.connections());
    writer.close(LADDER_ENTITY);
}

fn write_declaration(writer: &mut SmbpWriter, item: &str, declaration: &Declaration) {
    let address = declaration.address;
    writer.open(item);
    writer.field(ADDRESS, address);
    writer.field(INDEX, address.channel_number().unwrap_or(address.index()));
    writer.optional_field(SYMBOL, Some(declaration.symbol.as_str()));
    writer.field(COMMENT, &declaration.comment);
    writer.field(IS_USED, declaration.used);
    match &declaration.settings {
        DeclarationSettings::Timer(timer) => {
            writer.field(PRESET, timer.preset);
            writer.field(BASE, timer.base.as_str());
            writer.field(TIMER_TYPE, timer.timer_type.as_str());
        }
        DeclarationSettings::Counter(counter) => {
            writer.field(PRESET, counter.preset);
        }
        DeclarationSettings::Plain => {}
    }
    writer.close(item);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::assembler::assemble;
    use crate::application::builder::{build_hysteresis_rung, build_timer_rung};
    use crate::domain::Address;

    fn addr(text: &str) -> Address {
        text.parse().unwrap()
    }

    fn motor_text() -> String {
        let rungs = vec![
            build_hysteresis_rung(addr("%I0.1"), addr("%I0.2"), addr("%Q0.0")).unwrap(),
            build_timer_rung(addr("%I0.3"), addr("%TM0"), addr("%Q0.1"), 2).unwrap(),
        ];
        let declared = vec![Declaration::new(addr("%I0.1")).with_symbol("Start & Go")];
        serialize_document(&assemble("TM221CE24T", rungs, declared).unwrap())
    }

    #[test]
    fn envelope_has_bom_declaration_and_crlf() {
        let text = motor_text();
        assert!(text.starts_with("\u{feff}<?xml version=\"1.0\" encoding=\"utf-8\"?>\r\n"));
        assert!(!text.replace("\r\n", "").contains('\n'));
        assert!(text.contains("<ProjectDescriptor xmlns:xsi="));
        assert!(text.trim_end().ends_with("</ProjectDescriptor>"));
    }

    #[test]
    fn sections_follow_fixed_order() {
        let text = motor_text();
        let order: Vec<usize> = ["<Rungs>", "<DigitalInputs>", "<DigitalOutputs>", "<Timers>", "<SymbolTable>"]
            .iter()
            .map(|tag| text.find(tag).unwrap())
            .collect();
        assert!(order.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn lines_have_no_descriptor_and_text_is_escaped() {
        let text = motor_text();
        assert!(!text.contains("<Descriptor />"));
        assert!(!text.contains("<Symbol />"));
        assert!(text.contains("<Symbol>Start &amp; Go</Symbol>"));
        assert!(text.contains("<InstructionLine>LD    %I0.1</InstructionLine>"));
        assert!(text.contains("<ChosenConnection>Up, Left</ChosenConnection>"));
        assert!(text.contains("<TimerType>TON</TimerType>"));
    }
}
