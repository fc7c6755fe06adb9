use plasmaq_core::document::{Document, Entity, MalformedEntity};
use plasmaq_core::geometry::Point2;

use crate::DxfError;
use crate::entities;
use crate::reader::{GroupReader, Record};

/// 实体段内可能残留的序列记录，单独出现时没有意义。
const STRAY_IN_ENTITIES: &[&str] = &["SEQEND", "VERTEX", "ATTRIB"];
const STRAY_IN_BLOCK: &[&str] = &["SEQEND", "VERTEX", "ATTRIB", "ATTDEF"];

pub(crate) fn parse_document(source: &str) -> Result<Document, DxfError> {
    let mut reader = GroupReader::new(source);
    let mut document = Document::new();
    while let Some((code, value)) = reader.next_pair()? {
        match (code, value.trim()) {
            (999, _) => continue,
            (0, "SECTION") => parse_section(&mut reader, &mut document)?,
            (0, "EOF") => break,
            (0, other) => {
                return Err(DxfError::syntax(format!(
                    "意外的标记 {other}，期望 SECTION 或 EOF"
                )));
            }
            (code, _) => {
                return Err(DxfError::syntax(format!(
                    "意外的组码 {code}（期望 0 表示 SECTION/EOF）"
                )));
            }
        }
    }
    Ok(document)
}

fn parse_section(reader: &mut GroupReader<'_>, document: &mut Document) -> Result<(), DxfError> {
    let name = match reader.next_pair()? {
        Some((2, name)) => name.trim().to_string(),
        Some((code, _)) => {
            return Err(DxfError::syntax(format!(
                "SECTION 名称使用了组码 {code}（期望 2）"
            )));
        }
        None => return Err(DxfError::syntax("SECTION 缺少名称（组码 2）")),
    };
    match name.as_str() {
        "HEADER" => parse_header(reader, document),
        "ENTITIES" => {
            for entity in parse_entity_list(reader, "ENTITIES", "ENDSEC", STRAY_IN_ENTITIES)? {
                document.add_entity(entity);
            }
            Ok(())
        }
        "BLOCKS" => parse_blocks(reader, document),
        _ => skip_section(reader, &name),
    }
}

fn skip_section(reader: &mut GroupReader<'_>, name: &str) -> Result<(), DxfError> {
    while let Some((code, value)) = reader.next_pair()? {
        if code == 0 && value.trim() == "ENDSEC" {
            return Ok(());
        }
    }
    Err(DxfError::syntax(format!("{name} 段未找到 ENDSEC 终止标记")))
}

/// 只读取 `$INSUNITS`，取值损坏时按未设置处理。
fn parse_header(reader: &mut GroupReader<'_>, document: &mut Document) -> Result<(), DxfError> {
    let mut variable = String::new();
    while let Some((code, value)) = reader.next_pair()? {
        match code {
            0 if value.trim() == "ENDSEC" => return Ok(()),
            9 => variable = value.trim().to_string(),
            70 if variable == "$INSUNITS" => {
                document.set_insunits(value.trim().parse::<i16>().ok());
            }
            _ => {}
        }
    }
    Err(DxfError::syntax("HEADER 段未找到 ENDSEC 终止标记"))
}

fn parse_blocks(reader: &mut GroupReader<'_>, document: &mut Document) -> Result<(), DxfError> {
    loop {
        let Some((code, value)) = reader.next_pair()? else {
            return Err(DxfError::syntax("BLOCKS 段提前结束"));
        };
        if code != 0 {
            return Err(DxfError::syntax(format!(
                "BLOCKS 段遇到组码 {code}（期望 0 表示记录起始）"
            )));
        }
        match value.trim() {
            "ENDSEC" => return Ok(()),
            "BLOCK" => parse_block(reader, document)?,
            other => {
                reader.read_record(other)?;
            }
        }
    }
}

/// `*` 开头的布局块（模型空间、图纸空间）不登记。
fn parse_block(reader: &mut GroupReader<'_>, document: &mut Document) -> Result<(), DxfError> {
    let header = reader.read_record("BLOCK")?;
    let fields = header.fields();
    let name = fields
        .text(2)
        .ok_or_else(|| DxfError::syntax("BLOCK 缺少名称（组码 2）"))?
        .to_string();
    let base_x = fields.value::<f64>(10, "基点 X").map_err(into_syntax)?;
    let base_y = fields.value::<f64>(20, "基点 Y").map_err(into_syntax)?;

    let body = parse_entity_list(reader, &name, "ENDBLK", STRAY_IN_BLOCK)?;
    if !name.starts_with('*') {
        let base = Point2::new(base_x.unwrap_or(0.0), base_y.unwrap_or(0.0));
        document.add_block_definition(name, base, body);
    }
    Ok(())
}

/// 读取实体直到 `terminator` 记录（包含其组码对）。
fn parse_entity_list(
    reader: &mut GroupReader<'_>,
    owner: &str,
    terminator: &str,
    stray: &[&str],
) -> Result<Vec<Entity>, DxfError> {
    let mut entities = Vec::new();
    loop {
        let Some((code, value)) = reader.next_pair()? else {
            return Err(DxfError::syntax(format!("{owner} 在 {terminator} 之前结束")));
        };
        if code != 0 {
            return Err(DxfError::syntax(format!(
                "{owner} 中遇到组码 {code}（期望 0 表示实体起始）"
            )));
        }
        let kind = value.trim();
        if kind == terminator {
            reader.read_record(kind)?;
            return Ok(entities);
        }
        if stray.contains(&kind) {
            reader.read_record(kind)?;
            continue;
        }
        entities.push(parse_entity(reader, kind)?);
    }
}

/// 字段错误降级为 `Entity::Malformed`，组码流错误照常返回。
fn parse_entity(reader: &mut GroupReader<'_>, kind: &str) -> Result<Entity, DxfError> {
    let record = reader.read_record(kind)?;
    let built = match kind {
        "POLYLINE" => {
            let vertices = read_sequence(reader, "VERTEX")?;
            entities::polyline(&record, &vertices)
        }
        "INSERT" => {
            // 属性文本不参与切割
            read_sequence(reader, "ATTRIB")?;
            entities::build(&record)
        }
        _ => entities::build(&record),
    };
    match built {
        Ok(entity) => Ok(entity),
        Err(DxfError::Invalid { message }) => Ok(Entity::Malformed(MalformedEntity {
            kind: kind.to_string(),
            message,
            layer: record.fields().layer(),
        })),
        Err(err) => Err(err),
    }
}

/// 读取紧随其后的 `member` 记录及可选的 SEQEND。
fn read_sequence(reader: &mut GroupReader<'_>, member: &str) -> Result<Vec<Record>, DxfError> {
    let mut records = Vec::new();
    loop {
        match reader.peek_kind()?.as_deref() {
            Some(kind) if kind == member => {
                reader.next_pair()?;
                records.push(reader.read_record(member)?);
            }
            Some("SEQEND") => {
                reader.next_pair()?;
                reader.read_record("SEQEND")?;
                return Ok(records);
            }
            _ => return Ok(records),
        }
    }
}

fn into_syntax(err: DxfError) -> DxfError {
    match err {
        DxfError::Invalid { message } => DxfError::Syntax { message },
        other => other,
    }
}
