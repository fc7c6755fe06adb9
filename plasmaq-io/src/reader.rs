use std::str::FromStr;

use plasmaq_core::geometry::Point2;

use crate::DxfError;

/// 组码对：`(组码, 原始值)`，值只去掉行尾的 `\r`。
pub(crate) type GroupPair = (i32, String);

/// 逐对读取 ASCII DXF，支持回退一个组码对。
pub(crate) struct GroupReader<'a> {
    lines: std::str::Lines<'a>,
    pending: Option<GroupPair>,
    line_number: usize,
}

impl<'a> GroupReader<'a> {
    pub(crate) fn new(source: &'a str) -> Self {
        Self {
            lines: source.lines(),
            pending: None,
            line_number: 0,
        }
    }

    pub(crate) fn next_pair(&mut self) -> Result<Option<GroupPair>, DxfError> {
        if let Some(pair) = self.pending.take() {
            return Ok(Some(pair));
        }

        // 组码行之前的空行（常见于文件末尾）直接略过
        let code_line = loop {
            let Some(line) = self.lines.next() else {
                return Ok(None);
            };
            self.line_number += 1;
            if !line.trim().is_empty() {
                break line.trim();
            }
        };
        let code_line_number = self.line_number;

        let Some(value_line) = self.lines.next() else {
            return Err(DxfError::syntax(format!(
                "第 {code_line_number} 行的组码 {code_line} 之后缺少值行"
            )));
        };
        self.line_number += 1;

        let code = code_line.parse::<i32>().map_err(|_| {
            DxfError::syntax(format!(
                "第 {code_line_number} 行的组码 \"{code_line}\" 不是整数"
            ))
        })?;
        Ok(Some((code, value_line.trim_end_matches('\r').to_string())))
    }

    pub(crate) fn push_back(&mut self, pair: GroupPair) {
        debug_assert!(self.pending.is_none(), "只能回退一个组码对");
        self.pending = Some(pair);
    }

    /// 下一个组码 0 记录的类型名，不消费该记录。
    pub(crate) fn peek_kind(&mut self) -> Result<Option<String>, DxfError> {
        let Some(pair) = self.next_pair()? else {
            return Ok(None);
        };
        let kind = (pair.0 == 0).then(|| pair.1.trim().to_string());
        self.push_back(pair);
        Ok(kind)
    }

    /// 读取一条完整记录：组码 0 之后直到下一个组码 0（不含）的全部组码对。
    pub(crate) fn read_record(&mut self, kind: &str) -> Result<Record, DxfError> {
        let mut pairs = Vec::new();
        while let Some(pair) = self.next_pair()? {
            if pair.0 == 0 {
                self.push_back(pair);
                break;
            }
            pairs.push(pair);
        }
        Ok(Record {
            kind: kind.to_string(),
            pairs,
        })
    }
}

/// 一条 DXF 记录（实体、VERTEX、BLOCK 头等）的全部组码对。
#[derive(Debug, Clone)]
pub(crate) struct Record {
    pub(crate) kind: String,
    pub(crate) pairs: Vec<GroupPair>,
}

impl Record {
    pub(crate) fn fields(&self) -> Fields<'_> {
        Fields {
            kind: &self.kind,
            pairs: &self.pairs,
        }
    }
}

/// 记录（或其中一段）的只读视图，按组码取值并生成带上下文的错误。
#[derive(Debug, Clone, Copy)]
pub(crate) struct Fields<'a> {
    pub(crate) kind: &'a str,
    pub(crate) pairs: &'a [GroupPair],
}

impl<'a> Fields<'a> {
    pub(crate) fn slice(self, pairs: &'a [GroupPair]) -> Self {
        Self {
            kind: self.kind,
            pairs,
        }
    }

    /// 图层（组码 8），缺省为 `0`。
    pub(crate) fn layer(self) -> String {
        self.text(8).unwrap_or("0").to_string()
    }

    pub(crate) fn text(self, code: i32) -> Option<&'a str> {
        self.pairs
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, value)| value.trim())
    }

    /// 至多出现一次的标量字段。
    pub(crate) fn value<T: FromStr>(self, code: i32, what: &str) -> Result<Option<T>, DxfError> {
        let mut found = None;
        for (c, raw) in self.pairs {
            if *c != code {
                continue;
            }
            if found.is_some() {
                return Err(self.invalid(code, what, "出现重复值"));
            }
            found = Some(self.parse::<T>(code, what, raw)?);
        }
        Ok(found)
    }

    pub(crate) fn require<T: FromStr>(self, code: i32, what: &str) -> Result<T, DxfError> {
        self.value(code, what)?
            .ok_or_else(|| self.invalid(code, what, "缺失"))
    }

    /// 按出现顺序收集重复字段（节点值、权重等）。
    pub(crate) fn values<T: FromStr>(self, code: i32, what: &str) -> Result<Vec<T>, DxfError> {
        self.pairs
            .iter()
            .filter(|(c, _)| *c == code)
            .map(|(_, raw)| self.parse(code, what, raw))
            .collect()
    }

    /// 组码 `x_code` / `x_code + 10` 组成的点；两者都缺失时为 `None`。
    pub(crate) fn point(self, x_code: i32, what: &str) -> Result<Option<Point2>, DxfError> {
        let x = self.value::<f64>(x_code, what)?;
        let y = self.value::<f64>(x_code + 10, what)?;
        match (x, y) {
            (Some(x), Some(y)) => Ok(Some(Point2::new(x, y))),
            (None, None) => Ok(None),
            (Some(_), None) => Err(self.invalid(x_code + 10, what, "缺少 Y")),
            (None, Some(_)) => Err(self.invalid(x_code, what, "缺少 X")),
        }
    }

    pub(crate) fn require_point(self, x_code: i32, what: &str) -> Result<Point2, DxfError> {
        self.point(x_code, what)?
            .ok_or_else(|| self.invalid(x_code, what, "缺失"))
    }

    /// 重复出现的点序列，要求 X、Y 严格交替。
    pub(crate) fn points(self, x_code: i32, what: &str) -> Result<Vec<Point2>, DxfError> {
        let y_code = x_code + 10;
        let mut points = Vec::new();
        let mut pending_x: Option<f64> = None;
        for (code, raw) in self.pairs {
            if *code == x_code {
                if pending_x.is_some() {
                    return Err(self.invalid(x_code, what, "在 Y 之前重复出现"));
                }
                pending_x = Some(self.parse(x_code, what, raw)?);
            } else if *code == y_code {
                let x = pending_x
                    .take()
                    .ok_or_else(|| self.invalid(y_code, what, "缺少对应的 X"))?;
                points.push(Point2::new(x, self.parse(y_code, what, raw)?));
            }
        }
        if pending_x.is_some() {
            return Err(self.invalid(y_code, what, "缺少对应的 Y"));
        }
        Ok(points)
    }

    pub(crate) fn parse<T: FromStr>(self, code: i32, what: &str, raw: &str) -> Result<T, DxfError> {
        raw.trim()
            .parse::<T>()
            .map_err(|_| self.invalid(code, what, &format!("无法解析（值：\"{raw}\"）")))
    }

    pub(crate) fn invalid(self, code: i32, what: &str, problem: &str) -> DxfError {
        DxfError::invalid(format!("{} {what}（组码 {code}）{problem}", self.kind))
    }
}
