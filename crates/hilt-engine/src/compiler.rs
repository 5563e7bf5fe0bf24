//! Directive compilation
//!
//! Views are written in MiniJinja syntax extended with directives:
//!
//! ```text
//! @if(user)
//!     Hello {{ user.name }}
//! @endif
//!
//! @sayHello({"name": "World"})
//! @endsayHello
//! ```
//!
//! Before MiniJinja sees a view, every `@name` or `@name(expression)` whose
//! name is registered is replaced by the output of its handler. The handler
//! gets the raw text between the outer parentheses (or an empty string).
//! Unregistered names are left untouched, an `@` directly after a word
//! character is never a directive (`mail@example.com`), and `@@name` is an
//! escape that produces a literal `@name`.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use once_cell::sync::Lazy;
use regex::Regex;

/// Handler turning a directive expression into template source
pub type DirectiveHandler = Arc<dyn Fn(&str) -> String + Send + Sync>;

static DIRECTIVE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@(@?)([A-Za-z_][A-Za-z0-9_]*)").unwrap());

/// Revisions are unique across every registry in the process
static NEXT_REVISION: AtomicU64 = AtomicU64::new(1);

/// Distinguishes this process from others sharing a cache directory
static PROCESS_TOKEN: Lazy<String> = Lazy::new(|| {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!("{:x}-{:x}", std::process::id(), nanos)
});

#[derive(Clone)]
struct Entry {
    handler: DirectiveHandler,
    /// `None` for built-ins, whose output is the same in every process
    revision: Option<u64>,
}

impl Entry {
    fn marker(&self) -> String {
        match self.revision {
            Some(revision) => format!("{}:{}", PROCESS_TOKEN.as_str(), revision),
            None => format!("builtin:{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Name -> handler mapping used to compile views
///
/// Registering a name that already exists replaces its handler.
#[derive(Clone, Default)]
pub struct DirectiveRegistry {
    entries: BTreeMap<String, Entry>,
}

impl fmt::Debug for DirectiveRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectiveRegistry")
            .field("directives", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl DirectiveRegistry {
    /// Registry preloaded with the built-in directives
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register_builtins();
        registry
    }

    /// Registry without any directive
    pub fn empty() -> Self {
        Self::default()
    }

    fn register_builtins(&mut self) {
        self.insert("if", None, |expr| format!("{{% if {} %}}", expr));
        self.insert("elseif", None, |expr| format!("{{% elif {} %}}", expr));
        self.insert("else", None, |_| "{% else %}".to_string());
        self.insert("endif", None, |_| "{% endif %}".to_string());
        self.insert("foreach", None, |expr| format!("{{% for {} %}}", expr));
        self.insert("endforeach", None, |_| "{% endfor %}".to_string());
        self.insert("include", None, |expr| {
            format!("{{{{ include_view({}) }}}}", expr)
        });
        self.insert("component", None, |expr| {
            format!("{{% filter component({}) %}}", expr)
        });
        self.insert("endcomponent", None, |_| "{% endfilter %}".to_string());
    }

    /// Install or replace a directive
    pub fn register<F>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        let revision = NEXT_REVISION.fetch_add(1, Ordering::Relaxed);
        self.insert(name, Some(revision), handler);
    }

    fn insert<F>(&mut self, name: impl Into<String>, revision: Option<u64>, handler: F)
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.entries.insert(
            name.into(),
            Entry {
                handler: Arc::new(handler),
                revision,
            },
        );
    }

    /// Install the opening/closing pair for a component alias
    ///
    /// `@alias(data)` starts capturing the component body and `@endalias`
    /// renders `component` with the captured body as `slot`.
    pub fn register_component(&mut self, component: &str, alias: &str) {
        let component = component.to_string();
        self.register(alias, move |expr| {
            let data = match expr.trim() {
                "" => "{}",
                data => data,
            };
            format!("{{% filter component({:?}, {}) %}}", component, data)
        });
        self.register(format!("end{}", alias), |_| "{% endfilter %}".to_string());
    }

    pub fn get(&self, name: &str) -> Option<&DirectiveHandler> {
        self.entries.get(name).map(|entry| &entry.handler)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Digest of the registered names and their revisions
    ///
    /// Changes whenever a directive is added or replaced, and differs between
    /// registries (or processes) that registered the same names separately.
    /// A registry holding only built-ins always has the same fingerprint.
    pub fn fingerprint(&self) -> String {
        hilt_core::fingerprint(
            self.entries
                .iter()
                .map(|(name, entry)| format!("{}:{}", name, entry.marker())),
        )
    }

    /// Expand every registered directive in `source`
    ///
    /// Line numbers are kept stable: when a handler emits fewer newlines than
    /// the directive text it replaces, the difference is padded with a
    /// template comment.
    pub fn compile(&self, source: &str) -> String {
        let mut out = String::with_capacity(source.len());
        let mut cursor = 0;

        for caps in DIRECTIVE.captures_iter(source) {
            let Some(whole) = caps.get(0) else { continue };
            let start = whole.start();

            if start < cursor || preceded_by_word(source, start) {
                continue;
            }

            let escaped = caps.get(1).is_some_and(|m| !m.as_str().is_empty());
            let name = &caps[2];

            if escaped {
                out.push_str(&source[cursor..start]);
                out.push('@');
                out.push_str(name);
                cursor = whole.end();
                continue;
            }

            let Some(handler) = self.get(name) else {
                continue;
            };

            let (expression, end) =
                parse_expression(source, whole.end()).unwrap_or(("", whole.end()));

            let expanded = handler(expression);

            out.push_str(&source[cursor..start]);
            out.push_str(&expanded);
            pad_newlines(&mut out, &source[start..end], &expanded);
            cursor = end;
        }

        out.push_str(&source[cursor..]);
        out
    }
}

fn preceded_by_word(source: &str, at: usize) -> bool {
    source[..at]
        .chars()
        .next_back()
        .is_some_and(|c| c.is_alphanumeric() || c == '_')
}

/// Parse `( ... )` starting at `from`, skipping blanks before the paren
///
/// Returns the text between the outer parentheses and the offset just past
/// the closing one. Quotes are honoured so `@if(x == ")")` works.
fn parse_expression(source: &str, from: usize) -> Option<(&str, usize)> {
    let rest = &source[from..];
    let skipped = rest.len() - rest.trim_start_matches([' ', '\t']).len();
    let open = from + skipped;

    if !source[open..].starts_with('(') {
        return None;
    }

    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (offset, c) in source[open..].char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }

        match c {
            '\'' | '"' => quote = Some(c),
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    let close = open + offset;
                    return Some((&source[open + 1..close], close + 1));
                }
            }
            _ => {}
        }
    }

    None
}

fn pad_newlines(out: &mut String, replaced: &str, expanded: &str) {
    let consumed = replaced.matches('\n').count();
    let produced = expanded.matches('\n').count();

    if consumed > produced {
        out.push_str("{#");
        out.push_str(&"\n".repeat(consumed - produced));
        out.push_str("#}");
    }
}
