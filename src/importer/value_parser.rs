// ==========================================
// 表格批量导入 - 标量解析
// ==========================================
// 职责: 布尔 / 整数 / 小数 / 日期 / 日期时间 / 邮箱 / URL 的解析与识别
// 说明: 行转换与类型抽样共用同一组解析器，保证两处判定一致
// ==========================================

use crate::domain::job::DateOrder;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}$").expect("邮箱正则无效")
});

static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(https?|ftp)://[^\s/$.?#][^\s]*$").expect("URL 正则无效"));

const TRUE_TOKENS: [&str; 6] = ["true", "yes", "1", "on", "t", "y"];
const FALSE_TOKENS: [&str; 6] = ["false", "no", "0", "off", "f", "n"];

const ISO_DATE: &str = "%Y-%m-%d";
const MONTH_FIRST_DATE: &str = "%m/%d/%Y";
const DAY_FIRST_DATE: &str = "%d/%m/%Y";

const ISO_DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const MONTH_FIRST_DATETIME: [&str; 2] = ["%m/%d/%Y %H:%M:%S", "%m/%d/%Y %I:%M:%S %p"];
const DAY_FIRST_DATETIME: [&str; 2] = ["%d/%m/%Y %H:%M:%S", "%d/%m/%Y %I:%M:%S %p"];

/// 布尔解析（大小写不敏感）
pub fn parse_boolean(raw: &str) -> Option<bool> {
    let token = raw.trim().to_lowercase();
    if TRUE_TOKENS.contains(&token.as_str()) {
        Some(true)
    } else if FALSE_TOKENS.contains(&token.as_str()) {
        Some(false)
    } else {
        None
    }
}

/// 整数解析，允许 "12.0" 这类无小数部分的写法
pub fn parse_integer(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if let Ok(n) = trimmed.parse::<i64>() {
        return Some(n);
    }
    match trimmed.parse::<f64>() {
        Ok(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Some(f as i64),
        _ => None,
    }
}

pub fn parse_decimal(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|f| f.is_finite())
}

/// 日期解析: ISO 优先，其次按 DateOrder 尝试两种斜杠格式
pub fn parse_date(raw: &str, order: DateOrder) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    let slash_formats = match order {
        DateOrder::MonthFirst => [MONTH_FIRST_DATE, DAY_FIRST_DATE],
        DateOrder::DayFirst => [DAY_FIRST_DATE, MONTH_FIRST_DATE],
    };

    std::iter::once(ISO_DATE)
        .chain(slash_formats)
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
}

/// 日期时间解析: RFC3339 / ISO-8601 优先，其次为回退格式列表，最后接受纯日期
pub fn parse_datetime(raw: &str, order: DateOrder) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.naive_utc());
    }

    let slash_formats = match order {
        DateOrder::MonthFirst => [MONTH_FIRST_DATETIME, DAY_FIRST_DATETIME],
        DateOrder::DayFirst => [DAY_FIRST_DATETIME, MONTH_FIRST_DATETIME],
    };

    let parsed = ISO_DATETIME_FORMATS
        .iter()
        .copied()
        .chain(std::iter::once("%Y-%m-%d %I:%M:%S %p"))
        .chain(slash_formats.into_iter().flatten())
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok());

    parsed.or_else(|| {
        parse_date(trimmed, order).and_then(|d| d.and_hms_opt(0, 0, 0))
    })
}

pub fn is_email(raw: &str) -> bool {
    EMAIL_RE.is_match(raw.trim())
}

pub fn is_url(raw: &str) -> bool {
    URL_RE.is_match(raw.trim())
}

// ==========================================
// 文本列启发式识别
// ==========================================

pub fn looks_like_date(raw: &str) -> bool {
    parse_date(raw, DateOrder::MonthFirst).is_some()
        || parse_datetime(raw, DateOrder::MonthFirst).is_some()
}

pub fn looks_like_number(raw: &str) -> bool {
    parse_decimal(raw).is_some()
}
