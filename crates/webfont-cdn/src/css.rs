//! `@font-face` stylesheet generation.

use std::fmt;

use crate::BuiltSubset;

/// Single `@font-face` rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FontFaceRule<'a> {
    range_id: &'a str,
    family: &'a str,
    weight: u16,
    filename: &'a str,
    unicode_range: &'a str,
}

impl FontFaceRule<'_> {
    /// Declarations in the order they are emitted.
    fn declarations(&self) -> [(&'static str, Declaration<'_>); 6] {
        [
            ("font-family", Declaration::Quoted(self.family)),
            ("font-style", Declaration::Raw("normal")),
            ("font-weight", Declaration::Weight(self.weight)),
            ("font-display", Declaration::Raw("swap")),
            ("src", Declaration::Source(self.filename)),
            ("unicode-range", Declaration::Raw(self.unicode_range)),
        ]
    }
}

/// Formats the rule minified, or pretty-printed with the alternate flag (`{:#}`).
impl fmt::Display for FontFaceRule<'_> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let declarations = self.declarations();
        if formatter.alternate() {
            writeln!(formatter, "/* {} */", self.range_id)?;
            formatter.write_str("@font-face {\n")?;
            for (name, value) in declarations {
                writeln!(formatter, "  {name}: {value};")?;
            }
        } else {
            formatter.write_str("@font-face{")?;
            for (i, (name, value)) in declarations.into_iter().enumerate() {
                if i > 0 {
                    formatter.write_str(";")?;
                }
                write!(formatter, "{name}:{value}")?;
            }
        }
        formatter.write_str("}")
    }
}

#[derive(Debug, Clone, Copy)]
enum Declaration<'a> {
    Raw(&'a str),
    Quoted(&'a str),
    Weight(u16),
    Source(&'a str),
}

impl fmt::Display for Declaration<'_> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raw(value) => formatter.write_str(value),
            Self::Quoted(value) => {
                formatter.write_str("'")?;
                write_escaped(formatter, value)?;
                formatter.write_str("'")
            }
            Self::Weight(weight) => write!(formatter, "{weight}"),
            Self::Source(filename) => write!(formatter, "url({filename}) format('woff2')"),
        }
    }
}

/// Escapes a value for a single-quoted CSS string. Control chars are written as hex escapes
/// followed by a space, which terminates the escape.
fn write_escaped(formatter: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    for ch in value.chars() {
        match ch {
            '\\' | '\'' => write!(formatter, "\\{ch}")?,
            ch if ch.is_control() => write!(formatter, "\\{:x} ", u32::from(ch))?,
            ch => write!(formatter, "{ch}")?,
        }
    }
    Ok(())
}

/// Pretty-printed and minified versions of the same stylesheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stylesheets {
    /// Pretty-printed stylesheet with a `/* range ID */` comment before each rule.
    pub pretty: String,
    /// Minified stylesheet.
    pub minified: String,
}

/// Emits `@font-face` rules for the built subsets of a font variant, in the order of `subsets`.
///
/// Each rule declares the original textual `unicode-range` of the catalog entry rather than
/// the chars actually present in the subset; browsers only use it as a request hint.
pub fn emit_css(family: &str, weight: u16, subsets: &[BuiltSubset]) -> Stylesheets {
    let mut pretty = String::new();
    let mut minified = String::new();
    for (i, subset) in subsets.iter().enumerate() {
        let rule = FontFaceRule {
            range_id: &subset.range_id,
            family,
            weight,
            filename: &subset.filename,
            unicode_range: &subset.unicode_range,
        };
        if i > 0 {
            pretty.push('\n');
        }
        pretty += &format!("{rule:#}");
        minified += &rule.to_string();
    }
    Stylesheets { pretty, minified }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subset(range_id: &str, unicode_range: &str, byte_size: u64) -> BuiltSubset {
        BuiltSubset {
            range_id: range_id.to_owned(),
            filename: format!("Inter-Regular-{range_id}.woff2"),
            byte_size,
            unicode_range: unicode_range.to_owned(),
        }
    }

    /// Extracts `(family, weight, filename, unicode-range)` tuples from a stylesheet.
    fn parse_rules(css: &str) -> Vec<(String, String, String, String)> {
        let mut rules = vec![];
        let mut rest = css;
        while let Some(start) = rest.find("@font-face") {
            let body_start = start + rest[start..].find('{').unwrap() + 1;
            let body_end = body_start + rest[body_start..].find('}').unwrap();
            let body = &rest[body_start..body_end];
            rest = &rest[body_end + 1..];

            let declaration = |name: &str| {
                body.split(';')
                    .filter_map(|decl| decl.split_once(':'))
                    .find(|(key, _)| key.trim() == name)
                    .map(|(_, value)| value.trim().to_owned())
                    .unwrap()
            };
            assert_eq!(declaration("font-style"), "normal");
            assert_eq!(declaration("font-display"), "swap");
            rules.push((
                declaration("font-family"),
                declaration("font-weight"),
                declaration("src"),
                declaration("unicode-range"),
            ));
        }
        rules
    }

    #[test]
    fn pretty_rule_format() {
        let css = emit_css("Inter", 400, &[subset("basic-latin", "U+0-7F", 100)]);
        let expected = "/* basic-latin */\n\
            @font-face {\n  \
            font-family: 'Inter';\n  \
            font-style: normal;\n  \
            font-weight: 400;\n  \
            font-display: swap;\n  \
            src: url(Inter-Regular-basic-latin.woff2) format('woff2');\n  \
            unicode-range: U+0-7F;\n\
            }";
        assert_eq!(css.pretty, expected);
        assert_eq!(
            css.minified,
            "@font-face{font-family:'Inter';font-style:normal;font-weight:400;font-display:swap;\
             src:url(Inter-Regular-basic-latin.woff2) format('woff2');unicode-range:U+0-7F}"
        );
    }

    #[test]
    fn rules_follow_input_order() {
        let subsets = [
            subset("r1", "U+100-17F", 10),
            subset("r2", "U+0-7F", 1_000),
            subset("r3", "U+4E00-9FFF, U+3000", 100),
        ];
        let css = emit_css("Inter", 700, &subsets);

        let ranges: Vec<_> = parse_rules(&css.pretty)
            .into_iter()
            .map(|(.., unicode_range)| unicode_range)
            .collect();
        assert_eq!(ranges, ["U+100-17F", "U+0-7F", "U+4E00-9FFF, U+3000"]);
        let comment_positions: Vec<_> = ["/* r1 */", "/* r2 */", "/* r3 */"]
            .iter()
            .map(|comment| css.pretty.find(comment).unwrap())
            .collect();
        assert!(comment_positions.is_sorted());
    }

    #[test]
    fn pretty_and_minified_forms_encode_same_rules() {
        let subsets = [
            subset("latin", "U+0-FF", 10),
            subset("cjk", "U+4E00-9FFF", 1_000),
            subset("punct", "U+3000-303F,U+FF00-FFEF", 100),
        ];
        let css = emit_css("LXGW WenKai", 300, &subsets);
        let pretty_rules = parse_rules(&css.pretty);
        assert_eq!(pretty_rules.len(), 3);
        assert_eq!(pretty_rules, parse_rules(&css.minified));
        assert_eq!(
            pretty_rules[1],
            (
                "'LXGW WenKai'".to_owned(),
                "300".to_owned(),
                "url(Inter-Regular-cjk.woff2) format('woff2')".to_owned(),
                "U+4E00-9FFF".to_owned(),
            )
        );
        assert!(!css.minified.contains('\n'));
    }

    #[test]
    fn family_name_is_escaped() {
        let css = emit_css("Foo'}body{color:red}\\x\n", 400, &[subset("latin", "U+0-FF", 10)]);
        let expected_family = r"font-family:'Foo\'}body{color:red}\\x\a '";
        assert!(css.minified.starts_with(&format!("@font-face{{{expected_family};")), "{css:?}");
        assert!(css.pretty.contains(r"font-family: 'Foo\'}body{color:red}\\x\a ';"), "{css:?}");
        assert_eq!(css.minified.matches("@font-face").count(), 1);
    }

    #[test]
    fn no_subsets_produce_empty_stylesheets() {
        let css = emit_css("Inter", 400, &[]);
        assert!(css.pretty.is_empty());
        assert!(css.minified.is_empty());
    }
}
