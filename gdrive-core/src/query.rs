use std::fmt;

/// Title filter that matches every child of a parent.
pub const WILDCARD: &str = "*";

/// Builder for the `q` parameter of `files.list`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    title: Option<String>,
    parent_id: Option<String>,
    include_trashed: bool,
}

impl SearchQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// `title contains '<title>'`. The wildcard `*` drops the title clause.
    pub fn title_contains(mut self, title: impl Into<String>) -> Self {
        let title = title.into();
        self.title = if title == WILDCARD { None } else { Some(title) };
        self
    }

    pub fn in_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn include_trashed(mut self, include: bool) -> Self {
        self.include_trashed = include;
        self
    }

    pub fn render(&self) -> String {
        let mut clauses = Vec::with_capacity(3);
        if let Some(title) = &self.title {
            clauses.push(format!("title contains '{}'", escape(title)));
        }
        if !self.include_trashed {
            clauses.push("trashed=false".to_string());
        }
        if let Some(parent_id) = &self.parent_id {
            clauses.push(format!("'{}' in parents", escape(parent_id)));
        }
        clauses.join(" and ")
    }
}

impl fmt::Display for SearchQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '\\' | '\'') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}
