// ==========================================
// 表格批量导入 - 文本规范化与相似度
// ==========================================
// 职责: 表头规范化 / 值 slug / 相似度 / 最优候选选择
// 度量: 表头用归一化 Damerau-Levenshtein，取值用 Jaro-Winkler（短值缩写）
// 平局规则: 相似度相同取候选序列中先出现者
// ==========================================

use strsim::{jaro_winkler, normalized_damerau_levenshtein};

/// 表头/字段名规范化: 小写，`_` `-` 视为空格，折叠空白
pub fn normalize(raw: &str) -> String {
    raw.to_lowercase()
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// 值 slug: 小写，去除标点，空白/连字符折叠为 `-`
pub fn slugify(raw: &str) -> String {
    let mut slug = String::with_capacity(raw.len());
    let mut pending_dash = false;

    for ch in raw.trim().to_lowercase().chars() {
        if ch.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch);
        } else if ch.is_whitespace() || ch == '-' || ch == '_' {
            pending_dash = true;
        }
    }
    slug
}

/// 取值相似度 [0, 1]
pub fn ratio(a: &str, b: &str) -> f64 {
    jaro_winkler(&normalize(a), &normalize(b))
}

/// 表头相似度 [0, 1]: 编辑距离 / 较长串长度
pub fn header_ratio(a: &str, b: &str) -> f64 {
    normalized_damerau_levenshtein(&normalize(a), &normalize(b))
}

/// 在候选中选出相似度最高者
///
/// - `accept`: 阈值判断（表头为严格大于，值为大于等于）
/// - 平局保留先出现的候选
pub fn best_match<'a, K, I, F>(needle: &str, candidates: I, accept: F) -> Option<(K, f64)>
where
    I: IntoIterator<Item = (K, &'a str)>,
    F: Fn(f64) -> bool,
{
    best_match_by(needle, candidates, ratio, accept)
}

/// 同 `best_match`，相似度函数由调用方指定
pub fn best_match_by<'a, K, I, F>(
    needle: &str,
    candidates: I,
    score_fn: fn(&str, &str) -> f64,
    accept: F,
) -> Option<(K, f64)>
where
    I: IntoIterator<Item = (K, &'a str)>,
    F: Fn(f64) -> bool,
{
    let mut best: Option<(K, f64)> = None;
    for (key, text) in candidates {
        let score = score_fn(needle, text);
        if !accept(score) {
            continue;
        }
        match &best {
            Some((_, best_score)) if score <= *best_score => {}
            _ => best = Some((key, score)),
        }
    }
    best
}
