//! Everything already scheduled for processing.

use std::collections::HashSet;

/// Categories and articles live in separate namespaces.
#[derive(Debug, Default)]
pub struct VisitedSet {
    categories: HashSet<String>,
    articles: HashSet<String>,
}

impl VisitedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a category as scheduled. Returns `false` if it already was.
    pub fn mark_category(&mut self, ident: &str) -> bool {
        self.categories.insert(ident.to_string())
    }

    /// Mark an article as scheduled. Returns `false` if it already was.
    pub fn mark_article(&mut self, ident: &str) -> bool {
        self.articles.insert(ident.to_string())
    }

    pub fn categories(&self) -> usize {
        self.categories.len()
    }

    pub fn articles(&self) -> usize {
        self.articles.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marks_once_per_namespace() {
        let mut visited = VisitedSet::new();
        assert!(visited.mark_category("Food"));
        assert!(!visited.mark_category("Food"));
        assert!(visited.mark_article("Food"));
        assert!(!visited.mark_article("Food"));
        assert_eq!(visited.categories(), 1);
        assert_eq!(visited.articles(), 1);
    }
}
