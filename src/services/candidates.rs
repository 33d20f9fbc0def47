// 候选仓库名
// 来源是惰性序列，每一项在探测前单独校验，不合法的候选只产生一条错误结果

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

/// 候选名最大长度
pub const MAX_CANDIDATE_LEN: usize = 200;

/// 候选仓库名，读取失败的行也作为候选保留下来
#[derive(Debug)]
pub struct Candidate(io::Result<String>);

impl Candidate {
    pub fn new(name: impl Into<String>) -> Self {
        Self(Ok(name.into()))
    }

    /// 原始文本（读取失败时为空）
    pub fn raw(&self) -> &str {
        match &self.0 {
            Ok(name) => name,
            Err(_) => "",
        }
    }

    /// 校验并加上命名空间，返回最终名称
    pub fn resolve(self, namespace: Option<&str>) -> Result<String, CandidateError> {
        let name = self.0.map_err(|e| CandidateError::Unreadable(e.to_string()))?;
        let name = name.trim();
        validate_name(name)?;
        let name = match namespace {
            Some(ns) if !name.contains('/') => format!("{}/{}", ns.trim_matches('/'), name),
            _ => name.to_string(),
        };
        validate_name(&name)?;
        Ok(name)
    }
}

impl From<String> for Candidate {
    fn from(name: String) -> Self {
        Self(Ok(name))
    }
}

impl From<&str> for Candidate {
    fn from(name: &str) -> Self {
        Self(Ok(name.to_string()))
    }
}

impl From<io::Result<String>> for Candidate {
    fn from(line: io::Result<String>) -> Self {
        Self(line)
    }
}

/// 候选名不合法的原因
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CandidateError {
    #[error("candidate name is empty")]
    Empty,
    #[error("candidate name is longer than 200 characters")]
    TooLong,
    #[error("candidate name contains forbidden character {0:?}")]
    ForbiddenCharacter(char),
    #[error("candidate name contains path traversal")]
    PathTraversal,
    #[error("candidate name has an empty path segment")]
    EmptySegment,
    #[error("candidate name must not start with {0:?}")]
    LeadingCharacter(char),
    #[error("failed to read candidate: {0}")]
    Unreadable(String),
}

/// 只允许 `[A-Za-z0-9._-/]`，拒绝路径穿越和 shell 元字符
pub fn validate_name(name: &str) -> Result<(), CandidateError> {
    if name.is_empty() {
        return Err(CandidateError::Empty);
    }
    if name.chars().count() > MAX_CANDIDATE_LEN {
        return Err(CandidateError::TooLong);
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(*c, '.' | '_' | '-' | '/')))
    {
        return Err(CandidateError::ForbiddenCharacter(c));
    }
    if name.contains("..") {
        return Err(CandidateError::PathTraversal);
    }
    if name.starts_with('/') || name.ends_with('/') || name.contains("//") {
        return Err(CandidateError::EmptySegment);
    }
    for segment in name.split('/') {
        if let Some(c @ ('-' | '.')) = segment.chars().next() {
            return Err(CandidateError::LeadingCharacter(c));
        }
    }
    Ok(())
}

/// 逐行读取字典文件，跳过空行和 `#` 注释
pub fn wordlist(path: &Path) -> io::Result<impl Iterator<Item = Candidate>> {
    let reader = BufReader::new(File::open(path)?);
    Ok(reader.lines().filter_map(|line| match line {
        Ok(line) => {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                None
            } else {
                Some(Candidate::new(trimmed))
            }
        }
        Err(e) => Some(Candidate::from(Err::<String, _>(e))),
    }))
}
