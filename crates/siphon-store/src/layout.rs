//! Where each harvested artifact lands under the output directory.

use std::path::{Path, PathBuf};

/// Directory conventions rooted at the output directory.
///
/// Every caller-supplied name goes through [`safe_component`], so a handle or
/// id coming from a remote payload can never escape the root.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn access_token(&self) -> PathBuf {
        self.root.join("access_token.json")
    }

    /// `search/<slug>.json`
    pub fn search(&self, query: &str) -> PathBuf {
        self.root.join("search").join(format!("{}.json", slug(query)))
    }

    fn user_dir(&self, user: &str) -> PathBuf {
        self.root.join(safe_component(user))
    }

    /// `<user>/user_info.json`
    pub fn user_info(&self, user: &str) -> PathBuf {
        self.user_dir(user).join("user_info.json")
    }

    /// `<user>/all_videos.json`
    pub fn all_videos(&self, user: &str) -> PathBuf {
        self.user_dir(user).join("all_videos.json")
    }

    /// `<user>/comments/comments_<video>.json`
    pub fn video_comments(&self, user: &str, video_id: &str) -> PathBuf {
        self.user_dir(user)
            .join("comments")
            .join(format!("comments_{}.json", safe_component(video_id)))
    }

    /// `<user_id>/<user_id>.json`
    pub fn profile(&self, user_id: &str) -> PathBuf {
        let id = safe_component(user_id);
        self.root.join(&id).join(format!("{}.json", id))
    }

    /// `<user_id>/<user_id>_profile_pic.jpg`
    pub fn avatar(&self, user_id: &str) -> PathBuf {
        let id = safe_component(user_id);
        self.root.join(&id).join(format!("{}_profile_pic.jpg", id))
    }

    fn post_dir(&self, user_id: &str, post_id: &str) -> PathBuf {
        self.user_dir(user_id).join(safe_component(post_id))
    }

    /// `<user_id>/<post_id>/<post_id>.json`
    pub fn post(&self, user_id: &str, post_id: &str) -> PathBuf {
        self.post_dir(user_id, post_id)
            .join(format!("{}.json", safe_component(post_id)))
    }

    /// `<user_id>/<post_id>/<post_id>_video.mp4`
    pub fn post_video(&self, user_id: &str, post_id: &str) -> PathBuf {
        self.post_dir(user_id, post_id)
            .join(format!("{}_video.mp4", safe_component(post_id)))
    }

    /// `files/<site>_<n>.<ext>`, numbered per site from 1.
    pub fn file(&self, site: &str, n: usize, ext: &str) -> PathBuf {
        let ext = ext.trim().trim_start_matches('.');
        let name = if ext.is_empty() {
            format!("{}_{}", site_slug(site), n)
        } else {
            format!("{}_{}.{}", site_slug(site), n, safe_component(ext))
        };
        self.root.join("files").join(name)
    }
}

/// Makes `name` usable as a single path component.
///
/// Path separators and other unusual characters become `_`, and leading dots
/// are dropped so that `..` or hidden names cannot be produced.
pub fn safe_component(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | '@') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Lower-case, underscore-separated file stem for a free-text query.
pub fn slug(text: &str) -> String {
    let mut out = String::new();
    for c in text.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            out.push(c);
        } else if !out.is_empty() && !out.ends_with('_') {
            out.push('_');
        }
    }
    let trimmed: String = out.trim_end_matches('_').chars().take(80).collect();
    if trimmed.is_empty() {
        "query".to_string()
    } else {
        trimmed
    }
}

/// File-name prefix for a site URL: scheme dropped, slashes flattened.
pub fn site_slug(site: &str) -> String {
    let bare = site
        .trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/');
    safe_component(&bare.replace('/', "_"))
}
