// Template registry - Report templates loaded once at startup
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: BTreeMap<String, String>,
}

impl TemplateRegistry {
    pub fn new(templates: BTreeMap<String, String>) -> Self {
        Self { templates }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.templates.get(name).map(String::as_str)
    }

    /// Template names in alphabetical order
    pub fn names(&self) -> Vec<String> {
        self.templates.keys().cloned().collect()
    }
}

impl FromIterator<(String, String)> for TemplateRegistry {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
