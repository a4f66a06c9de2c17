//! The page tree and its flattened view.
//!
//! `index.json` holds a one-element array with the root node. Flattening the
//! tree yields one [`Page`] per node with values derived from its position:
//!
//! - `branch`: ids from the root down to the node, inclusive
//! - `path`: names below the root joined by `/` (`""` for the root, `None` when
//!   any ancestor below the root has no name)
//! - `to`: `/` followed by the path

use std::ops::Deref;

use crate::error::SiteError;
use crate::page::PageNode;

/// A flattened page with its tree-derived values.
#[derive(Clone, Debug, PartialEq)]
pub struct Page {
    /// The node without its children.
    pub node: PageNode,
    pub branch: Vec<String>,
    pub path: Option<String>,
    pub to: Option<String>,
}

impl Deref for Page {
    type Target = PageNode;

    fn deref(&self) -> &PageNode {
        &self.node
    }
}

impl Page {
    /// Number of ancestors above this page.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.branch.len().saturating_sub(1)
    }

    /// Relative `<base href>` reaching the site root from this page.
    #[must_use]
    pub fn base_href(&self) -> String {
        match self.depth() {
            0 => "./".to_owned(),
            n => vec![".."; n].join("/"),
        }
    }

    /// Keys this page is published under: `{path}/index.html` and
    /// `{loc}/index.html` when set.
    #[must_use]
    pub fn html_keys(&self) -> Vec<String> {
        let mut keys = Vec::with_capacity(2);
        if let Some(loc) = self.loc.as_deref().filter(|l| !l.is_empty()) {
            keys.push(loc_html_key(loc));
        }
        if let Some(path) = &self.path {
            keys.push(path_html_key(path));
        }
        keys
    }
}

/// Published key of a tree path (`index.html` for the root).
#[must_use]
pub fn path_html_key(path: &str) -> String {
    if path.is_empty() {
        "index.html".to_owned()
    } else {
        format!("{path}/index.html")
    }
}

/// Published key of an alternate location (`index.html` for `/`).
#[must_use]
pub fn loc_html_key(loc: &str) -> String {
    path_html_key(loc.trim_matches('/'))
}

/// Owner of the page tree.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ContentTree {
    root: Option<PageNode>,
}

impl ContentTree {
    /// Create an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a tree with `root`.
    #[must_use]
    pub fn with_root(root: PageNode) -> Self {
        Self { root: Some(root) }
    }

    /// Parse `index.json`. Empty content yields a tree with one blank root.
    pub fn from_index_json(content: &str) -> Result<Self, SiteError> {
        let content = content.trim();
        if content.is_empty() {
            return Ok(Self::with_root(PageNode::default()));
        }
        let mut nodes: Vec<PageNode> = serde_json::from_str(content)?;
        let root = if nodes.is_empty() {
            PageNode::default()
        } else {
            nodes.swap_remove(0)
        };
        Ok(Self::with_root(root))
    }

    /// Serialize as `index.json` (array holding the root).
    pub fn to_index_json(&self) -> Result<String, SiteError> {
        Ok(serde_json::to_string(&self.root.as_slice())?)
    }

    #[must_use]
    pub fn root(&self) -> Option<&PageNode> {
        self.root.as_ref()
    }

    pub fn root_mut(&mut self) -> Option<&mut PageNode> {
        self.root.as_mut()
    }

    /// Replace the root.
    pub fn set_root(&mut self, root: Option<PageNode>) {
        self.root = root;
    }

    /// Drop every node.
    pub fn clear(&mut self) {
        self.root = None;
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Title of the root page, used as the site title.
    #[must_use]
    pub fn site_title(&self) -> Option<&str> {
        self.root
            .as_ref()
            .and_then(|r| r.title.as_deref())
            .filter(|t| !t.is_empty())
    }

    #[must_use]
    pub fn find(&self, id: &str) -> Option<&PageNode> {
        self.root.as_ref()?.find(id)
    }

    pub fn find_mut(&mut self, id: &str) -> Option<&mut PageNode> {
        self.root.as_mut()?.find_mut(id)
    }

    /// Detach the node `id` with its subtree.
    pub fn remove(&mut self, id: &str) -> Option<PageNode> {
        fn detach(node: &mut PageNode, id: &str) -> Option<PageNode> {
            if let Some(index) = node.children.iter().position(|c| c.id == id) {
                return Some(node.children.remove(index));
            }
            node.children.iter_mut().find_map(|c| detach(c, id))
        }

        if self.root.as_ref().is_some_and(|r| r.id == id) {
            return self.root.take();
        }
        detach(self.root.as_mut()?, id)
    }

    /// Flatten the tree depth-first, parents first.
    #[must_use]
    pub fn pages(&self) -> Vec<Page> {
        let mut pages = Vec::new();
        if let Some(root) = &self.root {
            flatten(root, &[], Some(&[][..]), &mut pages);
        }
        pages
    }
}

fn flatten(node: &PageNode, branch: &[String], names: Option<&[&str]>, out: &mut Vec<Page>) {
    let mut own_branch = branch.to_vec();
    own_branch.push(node.id.clone());

    // The root contributes no segment.
    let own_names: Option<Vec<&str>> = if branch.is_empty() {
        names.map(<[&str]>::to_vec)
    } else {
        match (names, node.name.as_deref().filter(|n| !n.is_empty())) {
            (Some(names), Some(name)) => {
                let mut names = names.to_vec();
                names.push(name);
                Some(names)
            }
            _ => None,
        }
    };

    let path = own_names.as_ref().map(|n| n.join("/"));
    let to = path.as_ref().map(|p| format!("/{p}"));
    let page = Page {
        node: PageNode {
            children: Vec::new(),
            ..node.clone()
        },
        branch: own_branch.clone(),
        path,
        to,
    };
    out.push(page);

    for child in &node.children {
        flatten(child, &own_branch, own_names.as_deref(), out);
    }
}
