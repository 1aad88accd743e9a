use crate::markdown::Renderer;
use crate::references::parse_storage;

/// Where in-body references should point in the exported tree.
pub trait LinkTargets {
    /// Local relative path for an attachment of the current page.
    fn attachment(&self, filename: &str) -> Option<String>;

    /// Local file of another exported page. `space_key` is `None` for links
    /// within the same space.
    fn page(&self, space_key: Option<&str>, title: &str) -> Option<String>;
}

/// Resolves nothing; references keep their original names.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLinkTargets;

impl LinkTargets for NoLinkTargets {
    fn attachment(&self, _filename: &str) -> Option<String> {
        None
    }

    fn page(&self, _space_key: Option<&str>, _title: &str) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Conversion {
    pub markdown: String,
    pub warnings: Vec<String>,
}

pub trait Converter: Send + Sync {
    /// Never fails: constructs it does not know degrade to their text.
    fn to_markdown(&self, body: &str, targets: &dyn LinkTargets) -> Conversion;
}

/// Confluence storage format (XHTML with `ac:`/`ri:` elements) to Markdown.
#[derive(Debug, Default, Clone, Copy)]
pub struct StorageConverter;

impl Converter for StorageConverter {
    fn to_markdown(&self, body: &str, targets: &dyn LinkTargets) -> Conversion {
        let document = parse_storage(body);
        let mut renderer = Renderer::new(targets);
        let markdown = renderer.render_document(document.root_element());
        Conversion {
            markdown,
            warnings: renderer.into_warnings(),
        }
    }
}
