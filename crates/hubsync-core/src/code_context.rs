//! Heuristic code-context extraction from unified diffs.
//!
//! Only lines *added* by a diff are inspected. Symbol and import extraction
//! is line-oriented pattern matching for TypeScript and JavaScript; other
//! languages contribute their file, directory and language but no symbols.
//! The heuristics miss multi-line declarations and will occasionally pick up
//! a false positive. That is accepted: the output feeds search facets, not a
//! compiler.

use std::sync::LazyLock;

use regex::Regex;

use crate::github::PullRequestFile;
use crate::models::CodeContext;

/// Language reported for extensions missing from the lookup table.
pub const UNKNOWN_LANGUAGE: &str = "Unknown";

const LANGUAGES: &[(&str, &str)] = &[
    ("ts", "TypeScript"),
    ("tsx", "TypeScript"),
    ("mts", "TypeScript"),
    ("cts", "TypeScript"),
    ("js", "JavaScript"),
    ("jsx", "JavaScript"),
    ("mjs", "JavaScript"),
    ("cjs", "JavaScript"),
    ("py", "Python"),
    ("rs", "Rust"),
    ("go", "Go"),
    ("java", "Java"),
    ("kt", "Kotlin"),
    ("kts", "Kotlin"),
    ("scala", "Scala"),
    ("rb", "Ruby"),
    ("php", "PHP"),
    ("cs", "C#"),
    ("c", "C"),
    ("h", "C"),
    ("cc", "C++"),
    ("cpp", "C++"),
    ("cxx", "C++"),
    ("hpp", "C++"),
    ("swift", "Swift"),
    ("m", "Objective-C"),
    ("dart", "Dart"),
    ("ex", "Elixir"),
    ("exs", "Elixir"),
    ("erl", "Erlang"),
    ("hs", "Haskell"),
    ("lua", "Lua"),
    ("r", "R"),
    ("sh", "Shell"),
    ("bash", "Shell"),
    ("zsh", "Shell"),
    ("sql", "SQL"),
    ("html", "HTML"),
    ("css", "CSS"),
    ("scss", "SCSS"),
    ("less", "Less"),
    ("vue", "Vue"),
    ("svelte", "Svelte"),
    ("json", "JSON"),
    ("yaml", "YAML"),
    ("yml", "YAML"),
    ("toml", "TOML"),
    ("xml", "XML"),
    ("md", "Markdown"),
    ("mdx", "Markdown"),
    ("graphql", "GraphQL"),
    ("gql", "GraphQL"),
    ("proto", "Protocol Buffers"),
    ("tf", "HCL"),
];

/// Names that look like methods but carry no signal.
const EXCLUDED_NAMES: &[&str] = &[
    "constructor",
    "render",
    "componentDidMount",
    "componentDidUpdate",
    "componentWillUnmount",
    "componentWillMount",
    "componentWillReceiveProps",
    "componentWillUpdate",
    "componentDidCatch",
    "shouldComponentUpdate",
    "getDerivedStateFromProps",
    "getSnapshotBeforeUpdate",
    "getDerivedStateFromError",
];

const CONTROL_FLOW: &[&str] = &[
    "if", "else", "for", "while", "do", "switch", "case", "catch", "try", "finally", "return",
    "function", "with", "typeof", "new", "await", "yield",
];

static FUNCTION_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s*\*?\s*([A-Za-z_$][\w$]*)")
        .expect("valid function regex")
});

static ARROW_FN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:export\s+)?(?:const|let)\s+([A-Za-z_$][\w$]*)\s*(?::[^=]+)?=\s*(?:async\s+)?(?:\([^)]*\)|[A-Za-z_$][\w$]*)\s*(?::[^=]+?)?\s*=>",
    )
    .expect("valid arrow regex")
});

static WRAPPED_COMPONENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:export\s+)?(?:const|let)\s+([A-Za-z_$][\w$]*)\s*(?::[^=]+)?=\s*(?:React\.)?(?:memo|forwardRef)\s*[(<]",
    )
    .expect("valid wrapper regex")
});

static CLASS_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:export\s+)?(?:default\s+)?(?:abstract\s+)?class\s+([A-Za-z_$][\w$]*)")
        .expect("valid class regex")
});

static METHOD_SIG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s+(?:(?:public|private|protected|static|async|readonly|override|get|set)\s+)*([A-Za-z_$][\w$]*)\s*(?:<[^>]*>)?\s*\([^)]*\)\s*(?::\s*[^{=]+)?\{",
    )
    .expect("valid method regex")
});

static IMPORT_FROM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*import\s+.+?\s+from\s+['"]([^'"]+)['"]"#).expect("valid import regex")
});

static IMPORT_TAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*\}\s*from\s+['"]([^'"]+)['"]"#).expect("valid import tail regex")
});

static IMPORT_SIDE_EFFECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*import\s+['"]([^'"]+)['"]"#).expect("valid side-effect import regex")
});

static RE_EXPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*export\s+.+?\s+from\s+['"]([^'"]+)['"]"#).expect("valid re-export regex")
});

static REQUIRE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"require\(\s*['"]([^'"]+)['"]\s*\)"#).expect("valid require regex")
});

/// Language for a file path by extension. Unlisted extensions are `"Unknown"`.
pub fn detect_language(path: &str) -> &'static str {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    let Some((_, ext)) = file_name.rsplit_once('.') else {
        return UNKNOWN_LANGUAGE;
    };
    let ext = ext.to_ascii_lowercase();
    LANGUAGES
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, lang)| *lang)
        .unwrap_or(UNKNOWN_LANGUAGE)
}

fn supports_symbols(language: &str) -> bool {
    matches!(language, "TypeScript" | "JavaScript")
}

/// Lines added by a unified diff, without their leading `+`.
pub fn added_lines(patch: &str) -> impl Iterator<Item = &str> {
    patch
        .lines()
        .filter(|l| l.starts_with('+') && !l.starts_with("+++"))
        .map(|l| &l[1..])
}

/// Symbols found in one file's added lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileSymbols {
    pub components: Vec<String>,
    pub functions: Vec<String>,
    pub classes: Vec<String>,
    pub imports: Vec<String>,
}

impl FileSymbols {
    fn add_callable(&mut self, name: &str) {
        if EXCLUDED_NAMES.contains(&name) || CONTROL_FLOW.contains(&name) {
            return;
        }
        if name.chars().next().is_some_and(|c| c.is_ascii_uppercase()) {
            push_unique(&mut self.components, name);
        } else {
            push_unique(&mut self.functions, name);
        }
    }
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
}

fn first_capture<'t>(re: &Regex, line: &'t str) -> Option<&'t str> {
    re.captures(line).and_then(|c| c.get(1)).map(|m| m.as_str())
}

/// Extract symbols and imports from the added lines of `patch`.
///
/// Returns an empty result for anything that is not TypeScript or JavaScript.
pub fn extract_symbols(path: &str, patch: &str) -> FileSymbols {
    let mut symbols = FileSymbols::default();
    if !supports_symbols(detect_language(path)) {
        return symbols;
    }

    for line in added_lines(patch) {
        if let Some(name) = first_capture(&CLASS_DECL, line) {
            push_unique(&mut symbols.classes, name);
        } else if let Some(name) = first_capture(&FUNCTION_DECL, line) {
            symbols.add_callable(name);
        } else if let Some(name) = first_capture(&WRAPPED_COMPONENT, line) {
            symbols.add_callable(name);
        } else if let Some(name) = first_capture(&ARROW_FN, line) {
            symbols.add_callable(name);
        } else if let Some(name) = first_capture(&METHOD_SIG, line) {
            symbols.add_callable(name);
        }

        for re in [&*IMPORT_FROM, &*IMPORT_TAIL, &*IMPORT_SIDE_EFFECT, &*RE_EXPORT] {
            if let Some(module) = first_capture(re, line) {
                push_unique(&mut symbols.imports, module);
                break;
            }
        }
        for caps in REQUIRE.captures_iter(line) {
            if let Some(m) = caps.get(1) {
                push_unique(&mut symbols.imports, m.as_str());
            }
        }
    }

    symbols
}

/// Parent directory of a path, or `None` for root-level files.
fn parent_dir(path: &str) -> Option<&str> {
    path.rsplit_once('/').map(|(dir, _)| dir).filter(|d| !d.is_empty())
}

/// Union per-file results across a diff set, keeping first-discovery order.
pub fn aggregate_code_context(files: &[PullRequestFile]) -> CodeContext {
    let mut ctx = CodeContext::default();

    for file in files {
        let language = detect_language(&file.filename);
        if language != UNKNOWN_LANGUAGE {
            push_unique(&mut ctx.languages, language);
        }
        push_unique(&mut ctx.files, &file.filename);
        if let Some(dir) = parent_dir(&file.filename) {
            push_unique(&mut ctx.directories, dir);
        }

        let Some(patch) = file.patch.as_deref() else {
            continue;
        };
        let symbols = extract_symbols(&file.filename, patch);
        for name in &symbols.components {
            push_unique(&mut ctx.components, name);
        }
        for name in &symbols.functions {
            push_unique(&mut ctx.functions, name);
        }
        for name in &symbols.classes {
            push_unique(&mut ctx.classes, name);
        }
        for module in &symbols.imports {
            push_unique(&mut ctx.imports, module);
        }
    }

    ctx
}
