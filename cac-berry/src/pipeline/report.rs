//! 失败记录与评分导出, 均为 TSV.

use std::io::Write;
use std::path::Path;

use super::Stage;
use crate::artifact::write_atomic;
use crate::score::ScoreRecord;
use crate::{CacError, CacResult};

/// 单个受试者的失败.
#[derive(Clone, Debug, PartialEq)]
pub struct Failure {
    /// 受试者 ID.
    pub subject_id: String,

    /// 出错的阶段.
    pub stage: Stage,

    /// 错误种类, 见 [`CacError::kind`].
    pub kind: &'static str,

    /// 错误信息.
    pub message: String,
}

impl Failure {
    /// 由错误构建失败记录.
    pub fn new(subject_id: &str, stage: Stage, err: &CacError) -> Self {
        Self {
            subject_id: subject_id.to_string(),
            stage,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// TSV 字段中不允许出现制表符与换行.
fn field(s: &str) -> String {
    s.replace(['\t', '\n', '\r'], " ")
}

/// 写出失败记录, 列为 `subject_id, stage, kind, message`.
pub fn write_failures<P: AsRef<Path>>(path: P, failures: &[Failure]) -> CacResult<()> {
    write_atomic(path, |w| {
        writeln!(w, "subject_id\tstage\tkind\tmessage")?;
        for f in failures {
            writeln!(
                w,
                "{}\t{}\t{}\t{}",
                field(&f.subject_id),
                f.stage,
                f.kind,
                field(&f.message)
            )?;
        }
        Ok(())
    })
}

/// 写出评分表, 每个受试者每个类别一行.
///
/// 列为 `subject_id, class, agatston_score, volume_score, mass_score, risk_category`.
/// 未计算质量评分时 `mass_score` 为 `NA`. 风险等级是受试者的冠脉风险等级.
pub fn write_scores<P: AsRef<Path>>(path: P, records: &[ScoreRecord]) -> CacResult<()> {
    write_atomic(path, |w| {
        writeln!(
            w,
            "subject_id\tclass\tagatston_score\tvolume_score\tmass_score\trisk_category"
        )?;
        for r in records {
            for c in r.classes.iter() {
                let mass = c
                    .totals
                    .mass_mg
                    .map_or_else(|| "NA".to_string(), |m| format!("{m:.3}"));
                writeln!(
                    w,
                    "{}\t{}\t{:.3}\t{:.3}\t{}\t{}",
                    field(&r.subject_id),
                    c.class,
                    c.totals.agatston,
                    c.totals.volume_mm3,
                    mass,
                    r.risk
                )?;
            }
        }
        Ok(())
    })
}
