//! Template variables in Markdown.
//!
//! A line `<!-- @var name: value -->` defines a variable for its own file;
//! `{{ name }}` references are replaced by the file's definition first, then
//! by a global variable. Unknown references are left as written.

use std::collections::BTreeMap;

use memchr::memmem;
use serde::{Deserialize, Serialize};

const VAR_PREFIX: &str = "<!-- @var ";
const INCLUDE_PREFIX: &str = "<!-- @include:";
const COMMENT_SUFFIX: &str = " -->";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub value: String,
}

/// Import/export shape: `[[variables]]` entries.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableSet {
    #[serde(default)]
    pub variables: Vec<Variable>,
}

/// Splits definition lines out of `content`.
///
/// Returns the definitions in order and the remaining lines joined with `\n`.
/// `@include` lines are reserved and dropped as well.
#[must_use]
pub fn parse_definitions(content: &str) -> (Vec<Variable>, String) {
    let mut variables = Vec::new();
    let mut kept: Vec<&str> = Vec::new();

    for line in content.lines() {
        let trimmed = line.trim();
        if let Some(body) = trimmed
            .strip_prefix(VAR_PREFIX)
            .and_then(|rest| rest.strip_suffix(COMMENT_SUFFIX))
        {
            if let Some((name, value)) = body.split_once(':') {
                variables.push(Variable {
                    name: name.trim().to_owned(),
                    value: value.trim().to_owned(),
                });
            }
        } else if trimmed.starts_with(INCLUDE_PREFIX) && trimmed.ends_with(COMMENT_SUFFIX) {
            // reserved
        } else {
            kept.push(line);
        }
    }

    (variables, kept.join("\n"))
}

/// Expands `{{ name }}` references in `content`.
#[must_use]
pub fn expand(content: &str, globals: &BTreeMap<String, String>) -> String {
    let (definitions, body) = parse_definitions(content);
    let mut local = BTreeMap::new();
    for var in definitions {
        local.insert(var.name, var.value);
    }

    replace_references(&body, |name| {
        local
            .get(name)
            .or_else(|| globals.get(name))
            .map(String::as_str)
    })
}

/// Replaces every `{{...}}` whose trimmed name `lookup` knows.
///
/// A reference is `{{`, one or more characters other than `}`, then `}}`.
fn replace_references<'a>(text: &str, lookup: impl Fn(&str) -> Option<&'a str>) -> String {
    let bytes = text.as_bytes();
    let finder = memmem::Finder::new(b"{{");
    let mut out = String::with_capacity(text.len());
    let mut copied = 0;
    let mut pos = 0;

    while let Some(found) = finder.find(&bytes[pos..]) {
        let start = pos + found;
        let name_start = start + 2;
        let close = memchr::memchr(b'}', &bytes[name_start..]).map(|i| name_start + i);

        let Some(close) = close.filter(|&c| c > name_start && bytes.get(c + 1) == Some(&b'}'))
        else {
            pos = start + 1;
            continue;
        };

        let name = text[name_start..close].trim();
        if let Some(value) = lookup(name) {
            out.push_str(&text[copied..start]);
            out.push_str(value);
            copied = close + 2;
        }
        pos = close + 2;
    }

    out.push_str(&text[copied..]);
    out
}

/// Merges a TOML `[[variables]]` document into `globals`; later entries win.
pub fn import_toml(
    globals: &mut BTreeMap<String, String>,
    source: &str,
) -> Result<usize, toml::de::Error> {
    let set: VariableSet = toml::from_str(source)?;
    let count = set.variables.len();
    for var in set.variables {
        globals.insert(var.name, var.value);
    }
    Ok(count)
}

pub fn export_toml(globals: &BTreeMap<String, String>) -> Result<String, toml::ser::Error> {
    let set = VariableSet {
        variables: globals
            .iter()
            .map(|(name, value)| Variable {
                name: name.clone(),
                value: value.clone(),
            })
            .collect(),
    };
    toml::to_string(&set)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn globals(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn definitions_are_extracted_and_removed() {
        let src = "<!-- @var title: Hello: World -->\n# {{title}}\n  <!-- @include: other.md -->\nbody";
        let (vars, body) = parse_definitions(src);
        assert_eq!(
            vars,
            vec![Variable {
                name: "title".to_owned(),
                value: "Hello: World".to_owned()
            }]
        );
        assert_eq!(body, "# {{title}}\nbody");
    }

    #[test]
    fn malformed_definitions_are_not_extracted() {
        let (vars, body) = parse_definitions("<!-- @var nocolon -->\n<!-- @var a: b-->");
        assert!(vars.is_empty());
        assert_eq!(body, "<!-- @var a: b-->");
    }

    #[test]
    fn expansion_cases() {
        let g = globals(&[("name", "global"), ("who", "world")]);
        for (src, expected) in [
            ("Hello {{who}}!", "Hello world!"),
            ("Hello {{ who }}!", "Hello world!"),
            ("<!-- @var name: local -->\n{{name}}", "local"),
            ("{{missing}} stays", "{{missing}} stays"),
            ("{{}} and {{who", "{{}} and {{who"),
            ("{{{who}}", "{{{who}}"),
            ("{{a}b}}", "{{a}b}}"),
            ("x{{who}}{{who}}y", "xworldworldy"),
            ("no refs", "no refs"),
            ("ünïcödé {{who}} ✓", "ünïcödé world ✓"),
        ] {
            assert_eq!(expand(src, &g), expected, "{src}");
        }
    }

    #[test]
    fn braces_inside_a_name_are_part_of_it() {
        let g = globals(&[("{who", "brace")]);
        assert_eq!(expand("{{{who}}", &g), "brace");
    }

    #[test]
    fn toml_import_export() {
        let mut g = globals(&[("a", "1")]);
        let imported = import_toml(
            &mut g,
            "[[variables]]\nname = \"b\"\nvalue = \"2\"\n\n[[variables]]\nname = \"a\"\nvalue = \"3\"\n",
        );
        assert_eq!(imported.ok(), Some(2));
        assert_eq!(g, globals(&[("a", "3"), ("b", "2")]));

        let exported = export_toml(&g).unwrap_or_default();
        let mut back = BTreeMap::new();
        assert_eq!(import_toml(&mut back, &exported).ok(), Some(2));
        assert_eq!(back, g);
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let mut g = BTreeMap::new();
        assert!(import_toml(&mut g, "variables = 3").is_err());
        assert!(g.is_empty());
    }
}
