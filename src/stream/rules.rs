//! 正则替换规则
//!
//! 规则来自请求元数据（`x-regex` 头），格式沿用 JavaScript 的写法：
//!
//! ```text
//! [{"pattern": "foo(\\d+)", "flags": "gi", "replacement": "bar$1"}]
//! ```
//!
//! 规则按列表顺序作用于**单个 chunk 的文本**，第 i+1 条规则看到的是第 i 条的输出。
//! 匹配不会跨越 chunk 边界：被上游切开的模式可能漏匹配，这是已知限制。
//!
//! 模式由 `regex` crate 编译，不支持环视和反向引用，这类规则编译失败。
//! `\d`、`\w` 及其取反形式在编译前改写为 ASCII 字符类，与 JavaScript 一致；
//! `\b` 仍是 Unicode 单词边界。

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

use super::error::TransformError;

/// 规则描述（未编译）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteRuleSpec {
    /// 正则表达式
    pub pattern: String,
    /// JavaScript 风格的标志，默认 `g`
    #[serde(default = "default_flags")]
    pub flags: String,
    /// 替换模板，支持 `$1`、`$&`、`$<name>`、`$$`
    #[serde(default)]
    pub replacement: String,
}

fn default_flags() -> String {
    "g".to_string()
}

impl RewriteRuleSpec {
    pub fn new(pattern: &str, flags: &str, replacement: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            flags: flags.to_string(),
            replacement: replacement.to_string(),
        }
    }
}

/// 从 JSON 数组解析规则列表
pub fn parse_rule_specs(json: &str) -> Result<Vec<RewriteRuleSpec>, TransformError> {
    serde_json::from_str(json).map_err(|e| TransformError::InvalidRules(e.to_string()))
}

/// 编译后的替换规则，单个流的生命周期内不可变
#[derive(Debug, Clone)]
pub struct RewriteRule {
    regex: Regex,
    replacement: String,
    global: bool,
}

impl RewriteRule {
    /// 编译规则
    ///
    /// 标志映射：`g` 全部替换，`i` 忽略大小写，`m` 多行，`s` `.` 匹配换行，
    /// `x` 忽略模式中的空白；`u`、`y`、`d` 接受但不生效。其他字符返回 `InvalidFlag`。
    pub fn compile(spec: &RewriteRuleSpec) -> Result<Self, TransformError> {
        let mut builder = RegexBuilder::new(&translate_js_pattern(&spec.pattern));
        let mut global = false;

        for flag in spec.flags.chars() {
            match flag {
                'g' => global = true,
                'i' => {
                    builder.case_insensitive(true);
                }
                'm' => {
                    builder.multi_line(true);
                }
                's' => {
                    builder.dot_matches_new_line(true);
                }
                'x' => {
                    builder.ignore_whitespace(true);
                }
                'u' | 'y' | 'd' => {}
                other => return Err(TransformError::InvalidFlag { flag: other }),
            }
        }

        let regex = builder
            .build()
            .map_err(|source| TransformError::InvalidPattern {
                pattern: spec.pattern.clone(),
                source,
            })?;
        let replacement = convert_js_replacement(&spec.replacement, &regex);

        Ok(Self {
            regex,
            replacement,
            global,
        })
    }

    /// 对一段文本执行替换
    pub fn apply<'t>(&self, text: &'t str) -> Cow<'t, str> {
        if self.global {
            self.regex.replace_all(text, self.replacement.as_str())
        } else {
            self.regex.replace(text, self.replacement.as_str())
        }
    }
}

/// 按顺序应用全部规则
pub fn apply_rules(rules: &[RewriteRule], text: String) -> String {
    rules.iter().fold(text, |acc, rule| {
        let replaced = match rule.apply(&acc) {
            Cow::Borrowed(_) => None,
            Cow::Owned(replaced) => Some(replaced),
        };
        replaced.unwrap_or(acc)
    })
}

/// 将 JavaScript 的 `\d`、`\D`、`\w`、`\W` 改写为 ASCII 字符类
///
/// `regex` 中这些转义匹配 Unicode 字符。改写结果使用嵌套字符类，
/// 出现在 `[...]` 内部时同样有效。
fn translate_js_pattern(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut chars = pattern.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('d') => out.push_str("[0-9]"),
            Some('D') => out.push_str("[^0-9]"),
            Some('w') => out.push_str("[0-9A-Za-z_]"),
            Some('W') => out.push_str("[^0-9A-Za-z_]"),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// 将 JavaScript 替换模板转换为 `regex` crate 的模板语法
///
/// - `$$` -> 字面量 `$`
/// - `$&` -> 整个匹配
/// - `$n` / `$nn` -> 编号分组（优先两位数，分组不存在时按字面量处理）
/// - `$<name>` -> 命名分组
/// - `` $` `` 和 `$'` 不支持，按字面量输出
fn convert_js_replacement(template: &str, regex: &Regex) -> String {
    let group_count = regex.captures_len();
    let has_names = regex.capture_names().flatten().next().is_some();

    let chars: Vec<char> = template.chars().collect();
    let mut out = String::with_capacity(template.len());
    let mut i = 0;

    while i < chars.len() {
        if chars[i] != '$' {
            out.push(chars[i]);
            i += 1;
            continue;
        }

        match chars.get(i + 1).copied() {
            Some('$') => {
                out.push_str("$$");
                i += 2;
            }
            Some('&') => {
                out.push_str("${0}");
                i += 2;
            }
            Some(d1) if d1.is_ascii_digit() => {
                let one = d1.to_digit(10).unwrap_or(0) as usize;
                let two = chars
                    .get(i + 2)
                    .and_then(|d2| d2.to_digit(10))
                    .map(|d2| one * 10 + d2 as usize);

                match two {
                    Some(n) if n >= 1 && n < group_count => {
                        out.push_str(&format!("${{{}}}", n));
                        i += 3;
                    }
                    _ if one >= 1 && one < group_count => {
                        out.push_str(&format!("${{{}}}", one));
                        i += 2;
                    }
                    _ => {
                        out.push_str("$$");
                        out.push(d1);
                        i += 2;
                    }
                }
            }
            Some('<') if has_names => {
                let rest: String = chars[i + 2..].iter().collect();
                match rest.find('>') {
                    Some(end) => {
                        let name = &rest[..end];
                        out.push_str(&format!("${{{}}}", name));
                        i += 2 + name.chars().count() + 1;
                    }
                    None => {
                        out.push_str("$$");
                        i += 1;
                    }
                }
            }
            _ => {
                out.push_str("$$");
                i += 1;
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(pattern: &str, flags: &str, replacement: &str) -> RewriteRule {
        RewriteRule::compile(&RewriteRuleSpec::new(pattern, flags, replacement)).unwrap()
    }

    #[test]
    fn test_global_flag_replaces_all() {
        let global = rule("a", "g", "x");
        let single = rule("a", "", "x");

        assert_eq!(global.apply("banana"), "bxnxnx");
        assert_eq!(single.apply("banana"), "bxnana");
    }

    #[test]
    fn test_case_insensitive_flag() {
        let r = rule("hello", "gi", "hi");
        assert_eq!(r.apply("Hello HELLO"), "hi hi");
    }

    #[test]
    fn test_dot_all_flag() {
        let without = rule("a.b", "g", "X");
        let with = rule("a.b", "gs", "X");

        assert_eq!(without.apply("a\nb"), "a\nb");
        assert_eq!(with.apply("a\nb"), "X");
    }

    #[test]
    fn test_multi_line_flag() {
        let without = rule("^b", "g", "X");
        let with = rule("^b", "gm", "X");

        assert_eq!(without.apply("a\nb"), "a\nb");
        assert_eq!(with.apply("a\nb"), "a\nX");
    }

    #[test]
    fn test_ignore_whitespace_flag() {
        let r = rule("a b  # comment", "gx", "X");
        assert_eq!(r.apply("ab a b"), "X a b");
    }

    #[test]
    fn test_accepted_no_op_flags() {
        for flags in ["gu", "gy", "gd", "guyd"] {
            let r = rule("a", flags, "x");
            assert_eq!(r.apply("aa"), "xx", "flags={}", flags);
        }
    }

    #[test]
    fn test_non_global_flags_replace_first_only() {
        let r = rule("A", "i", "x");
        assert_eq!(r.apply("aA"), "xA");
    }

    #[test]
    fn test_digit_and_word_classes_are_ascii() {
        assert_eq!(rule(r"\d", "g", "#").apply("1٣"), "#٣");
        assert_eq!(rule(r"\w+", "g", "W").apply("abc é"), "W é");
        assert_eq!(rule(r"\D", "g", "_").apply("1٣"), "1_");
        assert_eq!(rule(r"\W", "g", "_").apply("a-é"), "a__");
    }

    #[test]
    fn test_ascii_classes_inside_brackets() {
        assert_eq!(rule(r"[\d.]+", "g", "N").apply("v1.2٣"), "vN٣");
        assert_eq!(rule(r"[^\d]", "g", "").apply("a1٣2"), "12");
    }

    #[test]
    fn test_escaped_backslash_not_rewritten() {
        let r = rule(r"\\d", "g", "X");
        assert_eq!(r.apply(r"\d 1"), "X 1");
    }

    #[test]
    fn test_lookaround_rejected() {
        for pattern in ["a(?=b)", "a(?!b)", "(?<=a)b", "(?<!a)b"] {
            let err = RewriteRule::compile(&RewriteRuleSpec::new(pattern, "g", "")).unwrap_err();
            assert!(
                matches!(err, TransformError::InvalidPattern { .. }),
                "pattern={}",
                pattern
            );
        }
    }

    #[test]
    fn test_backreference_rejected() {
        let err = RewriteRule::compile(&RewriteRuleSpec::new(r"(a)\1", "g", "")).unwrap_err();
        match err {
            TransformError::InvalidPattern { pattern, .. } => assert_eq!(pattern, r"(a)\1"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_flag_rejected() {
        let err = RewriteRule::compile(&RewriteRuleSpec::new("a", "gq", "b")).unwrap_err();
        assert!(matches!(err, TransformError::InvalidFlag { flag: 'q' }));
    }

    #[test]
    fn test_malformed_pattern_rejected() {
        let err = RewriteRule::compile(&RewriteRuleSpec::new("(unclosed", "g", "")).unwrap_err();
        assert!(matches!(err, TransformError::InvalidPattern { .. }));
    }

    #[test]
    fn test_js_numbered_groups() {
        let r = rule(r"(\w+)@(\w+)", "g", "$2 at $1");
        assert_eq!(r.apply("user@host"), "host at user");
    }

    #[test]
    fn test_js_group_followed_by_letters() {
        // `regex` 会把 `$1abc` 解析为名为 `1abc` 的分组，转换后必须加花括号
        let r = rule(r"(\d+)", "g", "$1px");
        assert_eq!(r.apply("width: 10"), "width: 10px");
    }

    #[test]
    fn test_js_whole_match_and_literal_dollar() {
        let r = rule(r"\d+", "g", "[$&] $$5");
        assert_eq!(r.apply("cost 3"), "cost [3] $5");
    }

    #[test]
    fn test_js_named_group() {
        let r = rule(r"(?P<word>\w+)!", "g", "<$<word>>");
        assert_eq!(r.apply("hey!"), "<hey>");
    }

    #[test]
    fn test_js_missing_group_is_literal() {
        let r = rule("a", "g", "$3");
        assert_eq!(r.apply("a"), "$3");
    }

    #[test]
    fn test_rules_applied_in_order() {
        let rules = vec![rule("a", "g", "b"), rule("b", "g", "c")];
        assert_eq!(apply_rules(&rules, "a".to_string()), "c");
    }

    #[test]
    fn test_parse_rule_specs_defaults() {
        let specs = parse_rule_specs(r#"[{"pattern":"foo","replacement":"bar"},{"pattern":"x"}]"#)
            .unwrap();

        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].flags, "g");
        assert_eq!(specs[1].replacement, "");
    }

    #[test]
    fn test_parse_rule_specs_invalid_json() {
        let err = parse_rule_specs("not json").unwrap_err();
        assert!(matches!(err, TransformError::InvalidRules(_)));
    }
}
