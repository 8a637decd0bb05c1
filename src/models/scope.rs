//! Snippet scopes and the scope classifier.
//!
//! A scope decides both what kind of code a snippet holds and where it runs.
//! Classification is a pure function of the scope string so that legacy rows
//! with an unknown scope still map to something sensible.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Scope {
    Global,
    Admin,
    FrontEnd,
    SingleUse,
    Content,
    AdminCss,
    SiteCss,
    SiteHeadJs,
    SiteFooterJs,
}

impl Scope {
    pub const ALL: [Scope; 9] = [
        Scope::Global,
        Scope::Admin,
        Scope::FrontEnd,
        Scope::SingleUse,
        Scope::Content,
        Scope::AdminCss,
        Scope::SiteCss,
        Scope::SiteHeadJs,
        Scope::SiteFooterJs,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Global => "global",
            Scope::Admin => "admin",
            Scope::FrontEnd => "front-end",
            Scope::SingleUse => "single-use",
            Scope::Content => "content",
            Scope::AdminCss => "admin-css",
            Scope::SiteCss => "site-css",
            Scope::SiteHeadJs => "site-head-js",
            Scope::SiteFooterJs => "site-footer-js",
        }
    }

    pub fn code_type(&self) -> CodeType {
        classify(self.as_str()).code_type
    }

    pub fn render_context(&self) -> RenderContext {
        classify(self.as_str()).render_context
    }

    /// The emitted asset bundle this scope feeds, if any.
    pub fn asset_bucket(&self) -> Option<AssetBucket> {
        match self {
            Scope::AdminCss => Some(AssetBucket::AdminCss),
            Scope::SiteCss => Some(AssetBucket::SiteCss),
            Scope::SiteHeadJs => Some(AssetBucket::SiteHeadJs),
            Scope::SiteFooterJs => Some(AssetBucket::SiteFooterJs),
            _ => None,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown scope '{0}'")]
pub struct UnknownScope(pub String);

impl FromStr for Scope {
    type Err = UnknownScope;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Scope::ALL
            .iter()
            .copied()
            .find(|scope| scope.as_str() == s)
            .ok_or_else(|| UnknownScope(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CodeType {
    Php,
    Css,
    Js,
    Html,
}

impl CodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodeType::Php => "php",
            CodeType::Css => "css",
            CodeType::Js => "js",
            CodeType::Html => "html",
        }
    }
}

/// Where a snippet of a given scope takes effect.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RenderContext {
    Everywhere,
    Admin,
    Frontend,
    Content,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct Classification {
    pub code_type: CodeType,
    pub render_context: RenderContext,
}

/// Classify a raw scope string. Total: unknown scopes are php that runs everywhere.
///
/// Suffix checks run before the exact `content` match; the first hit wins.
pub fn classify(scope: &str) -> Classification {
    let code_type = if scope.ends_with("-css") {
        CodeType::Css
    } else if scope.ends_with("-js") {
        CodeType::Js
    } else if scope == "content" {
        CodeType::Html
    } else {
        CodeType::Php
    };

    let render_context = match scope {
        "admin" | "admin-css" => RenderContext::Admin,
        "front-end" | "site-css" | "site-head-js" | "site-footer-js" => RenderContext::Frontend,
        "content" => RenderContext::Content,
        _ => RenderContext::Everywhere,
    };

    Classification {
        code_type,
        render_context,
    }
}

/// A css/js bundle served as a single versioned asset.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum AssetBucket {
    AdminCss,
    SiteCss,
    SiteHeadJs,
    SiteFooterJs,
}

impl AssetBucket {
    pub const ALL: [AssetBucket; 4] = [
        AssetBucket::AdminCss,
        AssetBucket::SiteCss,
        AssetBucket::SiteHeadJs,
        AssetBucket::SiteFooterJs,
    ];

    pub fn scope(&self) -> Scope {
        match self {
            AssetBucket::AdminCss => Scope::AdminCss,
            AssetBucket::SiteCss => Scope::SiteCss,
            AssetBucket::SiteHeadJs => Scope::SiteHeadJs,
            AssetBucket::SiteFooterJs => Scope::SiteFooterJs,
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.scope().as_str()
    }

    pub fn code_type(&self) -> CodeType {
        self.scope().code_type()
    }

    pub fn extension(&self) -> &'static str {
        match self.code_type() {
            CodeType::Css => "css",
            _ => "js",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self.code_type() {
            CodeType::Css => "text/css; charset=utf-8",
            _ => "text/javascript; charset=utf-8",
        }
    }

    /// Parse an asset file name such as `site-css.css`.
    pub fn from_file_name(file: &str) -> Option<Self> {
        let (stem, ext) = file.rsplit_once('.')?;
        let bucket = stem.parse::<Scope>().ok()?.asset_bucket()?;
        (bucket.extension() == ext).then_some(bucket)
    }

    pub fn file_name(&self) -> String {
        format!("{}.{}", self.as_str(), self.extension())
    }
}

impl FromStr for AssetBucket {
    type Err = UnknownScope;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<Scope>()?
            .asset_bucket()
            .ok_or_else(|| UnknownScope(s.to_string()))
    }
}
