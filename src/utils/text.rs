//! 文本处理工具
//!
//! HTML 转纯文本、年份提取、位置识别等纯函数

use phf::phf_map;
use regex::Regex;
use std::sync::OnceLock;

/// 位置别名表（小写 → 标准名称）
static LOCATION_ALIASES: phf::Map<&'static str, &'static str> = phf_map! {
    "india" => "India",
    "us" => "United States",
    "usa" => "United States",
    "united states" => "United States",
    "america" => "United States",
    "uk" => "United Kingdom",
    "united kingdom" => "United Kingdom",
    "britain" => "United Kingdom",
    "canada" => "Canada",
    "global" => "Global",
    "worldwide" => "Global",
    "company wide" => "Global",
    "company-wide" => "Global",
};

/// 无效标题（小写比较）
static INVALID_TITLES: phf::Set<&'static str> = phf::phf_set! {
    "",
    "no title",
    "untitled",
    "none",
    "holiday balance",
};

fn tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]+>").expect("static regex"))
}

fn whitespace_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("static regex"))
}

fn year_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b20[2-3][0-9]\b").expect("static regex"))
}

fn block_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)<(p|li|h[1-6]|tr)[\s>]").expect("static regex"))
}

fn word_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Za-z]+").expect("static regex"))
}

/// 去掉 HTML 标签，解码常见实体，合并空白
pub fn strip_html(html: &str) -> String {
    if html.is_empty() {
        return String::new();
    }
    let text = tag_regex().replace_all(html, " ");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");
    whitespace_regex().replace_all(&text, " ").trim().to_string()
}

/// 提取文本中最新的年份（2020-2039）
pub fn latest_year(text: &str) -> Option<i32> {
    year_regex()
        .find_iter(text)
        .filter_map(|m| m.as_str().parse::<i32>().ok())
        .max()
}

/// 将用户输入的位置归一化为标准名称
///
/// 不在别名表中的位置保留原样（去掉首尾空白）
pub fn normalize_location(location: &str) -> Option<String> {
    let trimmed = location.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lower = trimmed.to_lowercase();
    Some(
        LOCATION_ALIASES
            .get(lower.as_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| trimmed.to_string()),
    )
}

/// 在文本中找到第一个出现的位置标签
///
/// 单独的 "us" 只在全大写时才算美国，避免误匹配英文代词
pub fn detect_location(text: &str) -> Option<String> {
    let words: Vec<&str> = word_regex().find_iter(text).map(|m| m.as_str()).collect();

    for (i, word) in words.iter().enumerate() {
        if let Some(next) = words.get(i + 1) {
            let pair = format!("{} {}", word.to_lowercase(), next.to_lowercase());
            if let Some(name) = LOCATION_ALIASES.get(pair.as_str()) {
                return Some(name.to_string());
            }
        }

        let lower = word.to_lowercase();
        if lower == "us" && *word != "US" {
            continue;
        }
        if let Some(name) = LOCATION_ALIASES.get(lower.as_str()) {
            return Some(name.to_string());
        }
    }
    None
}

/// HTML 中段落、列表项、标题、表格行的数量
pub fn block_count(html: &str) -> usize {
    block_regex().find_iter(html).count()
}

/// 标题是否有效
pub fn is_valid_title(title: &str) -> bool {
    let lower = title.trim().to_lowercase();
    !INVALID_TITLES.contains(lower.as_str())
}

/// 截断长文本用于日志显示
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
