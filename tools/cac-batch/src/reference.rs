//! 参考评分表, 用于计算风险分级一致性.
//!
//! TSV 格式, 允许 `#` 注释与空行, 第一个非注释行为表头,
//! 至少包含 `subject_id` 与 `agatston_score` 两列.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use cac_berry::score::{RiskBands, RiskCategory, ScoreRecord};
use ordered_float::NotNan;

/// 受试者 ID 到参考 Agatston 评分.
#[derive(Debug, Default)]
pub struct ReferenceScores {
    scores: BTreeMap<String, NotNan<f64>>,
}

impl ReferenceScores {
    /// 从文件读取.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read reference table {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("invalid reference table {}", path.display()))
    }

    /// 解析表格内容.
    pub fn parse(content: &str) -> Result<Self> {
        let mut lines = content
            .lines()
            .enumerate()
            .map(|(i, l)| (i + 1, l.trim_end_matches('\r')))
            .filter(|(_, l)| !l.trim().is_empty() && !l.starts_with('#'));

        let Some((_, header)) = lines.next() else {
            bail!("missing header");
        };
        let columns: Vec<&str> = header.split('\t').map(str::trim).collect();
        let col = |name: &str| {
            columns
                .iter()
                .position(|c| *c == name)
                .with_context(|| format!("missing column `{name}`"))
        };
        let (id_col, score_col) = (col("subject_id")?, col("agatston_score")?);

        let mut scores = BTreeMap::new();
        for (no, line) in lines {
            let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
            let (Some(id), Some(raw)) = (fields.get(id_col), fields.get(score_col)) else {
                bail!("line {no}: expected at least {} columns", id_col.max(score_col) + 1);
            };
            let score: f64 = raw
                .parse()
                .with_context(|| format!("line {no}: invalid score `{raw}`"))?;
            let score = NotNan::new(score).with_context(|| format!("line {no}: score is NaN"))?;
            if scores.insert(id.to_string(), score).is_some() {
                bail!("line {no}: duplicate subject `{id}`");
            }
        }
        Ok(Self { scores })
    }

    /// 参考评分个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    /// 将评分记录与参考评分配对为 `(预测, 参考)` 风险等级. 无参考评分的记录被忽略.
    pub fn pair_with(
        &self,
        records: &[ScoreRecord],
        bands: &RiskBands,
    ) -> Vec<(RiskCategory, RiskCategory)> {
        records
            .iter()
            .filter_map(|r| {
                let s = self.scores.get(&r.subject_id)?;
                Some((r.risk, bands.categorize(*s)))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cac_berry::score::ScoreEngine;

    const TABLE: &str = "\
# reference reads
subject_id\tagatston_score
p1\t0
p2\t55.5
p3\t1200
";

    #[test]
    fn test_parse() {
        let r = ReferenceScores::parse(TABLE).unwrap();
        assert_eq!(r.len(), 3);
    }

    #[test]
    fn test_parse_errors() {
        assert!(ReferenceScores::parse("").is_err());
        assert!(ReferenceScores::parse("subject_id\n").is_err());
        assert!(ReferenceScores::parse("subject_id\tagatston_score\np1\tx\n").is_err());
        assert!(ReferenceScores::parse("subject_id\tagatston_score\np1\tNaN\n").is_err());
        assert!(ReferenceScores::parse("subject_id\tagatston_score\np1\t1\np1\t2\n").is_err());
    }

    #[test]
    fn test_pair_with() {
        let r = ReferenceScores::parse(TABLE).unwrap();
        let engine = ScoreEngine::default();
        let records = vec![
            engine.score("p2", &[]).unwrap(),
            engine.score("p9", &[]).unwrap(),
        ];
        let pairs = r.pair_with(&records, engine.bands());
        assert_eq!(pairs, vec![(RiskCategory::None, RiskCategory::Mild)]);
    }
}
