//! 动作解析：任务的 action 字符串 -> 已知动作或通用回退
//!
//! 分解结果是自由文本，未知动作一律落到 Generic，不会直接失败。

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    AnalyzeGoal,
    ExecuteGoal,
    ValidateResult,
    CalculateSquareRoot,
    CreateFile,
    ExploreTools,
    Generic(String),
}

impl Action {
    /// 大小写与空白不敏感；空格和连字符视为下划线
    pub fn parse(action: &str) -> Self {
        let normalized: String = action
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c == ' ' || c == '-' { '_' } else { c })
            .collect();
        match normalized.as_str() {
            "analyze_goal" => Action::AnalyzeGoal,
            "execute_goal" => Action::ExecuteGoal,
            "validate_result" => Action::ValidateResult,
            "calculate_square_root" => Action::CalculateSquareRoot,
            "create_file" => Action::CreateFile,
            "explore_tools" => Action::ExploreTools,
            _ => Action::Generic(action.trim().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Action::AnalyzeGoal => "analyze_goal",
            Action::ExecuteGoal => "execute_goal",
            Action::ValidateResult => "validate_result",
            Action::CalculateSquareRoot => "calculate_square_root",
            Action::CreateFile => "create_file",
            Action::ExploreTools => "explore_tools",
            Action::Generic(name) => name,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 文本中最后一个数字（如 "square root of 144" -> 144）
pub fn parse_operand(text: &str) -> Option<f64> {
    text.split(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-'))
        .map(|token| token.trim_end_matches('.'))
        .filter(|token| token.chars().any(|c| c.is_ascii_digit()))
        .filter_map(|token| token.parse::<f64>().ok())
        .last()
}

/// 文本中第一个形如文件名的词（含扩展名），如 "results.txt"
pub fn parse_file_path(text: &str) -> Option<String> {
    text.split_whitespace()
        .map(|word| {
            word.trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | ',' | ';' | ':' | '(' | ')' | '.'))
        })
        .find(|word| {
            !word.contains("://")
                && word
                    .rsplit_once('.')
                    .is_some_and(|(stem, ext)| {
                        !stem.is_empty()
                            && !ext.is_empty()
                            && ext.len() <= 5
                            && ext.chars().all(|c| c.is_ascii_alphanumeric())
                            && ext.chars().any(|c| c.is_ascii_alphabetic())
                    })
        })
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_and_generic() {
        assert_eq!(Action::parse("calculate_square_root"), Action::CalculateSquareRoot);
        assert_eq!(Action::parse(" Analyze Goal "), Action::AnalyzeGoal);
        assert_eq!(Action::parse("explore-tools"), Action::ExploreTools);
        assert_eq!(
            Action::parse("summarize_findings"),
            Action::Generic("summarize_findings".into())
        );
    }

    #[test]
    fn test_parse_operand() {
        assert_eq!(parse_operand("Calculate the square root of 144"), Some(144.0));
        assert_eq!(parse_operand("sqrt of 2.25."), Some(2.25));
        assert_eq!(parse_operand("no numbers here"), None);
    }

    #[test]
    fn test_parse_file_path() {
        assert_eq!(
            parse_file_path("Save the answer to 'results.txt'."),
            Some("results.txt".into())
        );
        assert_eq!(parse_file_path("version 1.5 release"), None);
        assert_eq!(parse_file_path("see https://example.com"), None);
    }
}
