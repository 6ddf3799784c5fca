/// Lazily compiled static regex for a literal pattern.
#[macro_export]
macro_rules! regex {
    ($pat:literal) => {{
        static RE: once_cell::sync::Lazy<regex::Regex> =
            once_cell::sync::Lazy::new(|| regex::Regex::new($pat).unwrap());
        &*RE
    }};
}

/// Build rule-source text from one string per line.
///
/// ```
/// let source = parley::rive![
///     "+ hello bot",
///     "- Hello, human!",
/// ];
/// assert_eq!(source, "+ hello bot\n- Hello, human!");
/// ```
#[macro_export]
macro_rules! rive {
    ($($line:expr),* $(,)?) => {{
        let lines: &[&str] = &[$($line),*];
        lines.join("\n")
    }};
}
