//! 批处理结果汇总.

use std::io::{self, Write};
use std::path::PathBuf;

use cac_berry::pipeline::BatchReport;
use cac_berry::score::{Concordance, RiskCategory};

const S4: &str = "    ";

/// 将批次计数与风险分布写进 `w` 中.
fn describe_into<W: Write>(r: &BatchReport, w: &mut W) -> io::Result<()> {
    writeln!(w, "Batch:")?;
    writeln!(w, "{S4}Computed: {}", r.computed)?;
    writeln!(w, "{S4}Resumed: {}", r.resumed)?;
    writeln!(w, "{S4}Filtered out: {}", r.filtered)?;
    writeln!(w, "{S4}Failed: {}", r.failures.len())?;

    writeln!(w, "Coronary risk:")?;
    for cat in RiskCategory::ALL {
        let n = r.records.iter().filter(|rec| rec.risk == cat).count();
        writeln!(w, "{S4}{:<8} {n}", cat.name())?;
    }
    let total: f64 = r.records.iter().map(|rec| rec.coronary.agatston).sum();
    if !r.records.is_empty() {
        write!(
            w,
            "{S4}Mean coronary Agatston: {:.3}",
            total / r.records.len() as f64
        )?;
    } else {
        write!(w, "{S4}Mean coronary Agatston: /")?;
    }
    Ok(())
}

/// 将失败记录写进 `w` 中.
fn describe_failures_into<W: Write>(r: &BatchReport, w: &mut W) -> io::Result<()> {
    write!(w, "Failures:")?;
    for f in r.failures.iter() {
        write!(w, "\n{S4}{} [{}] {}: {}", f.subject_id, f.stage, f.kind, f.message)?;
    }
    Ok(())
}

/// 将一致性结果写进 `w` 中. 矩阵的行为预测等级, 列为参考等级.
fn describe_concordance_into<W: Write>(n: usize, c: &Concordance, w: &mut W) -> io::Result<()> {
    writeln!(w, "Concordance against {n} reference scores:")?;
    writeln!(w, "{S4}Exact agreement: {:.4}", c.agreement)?;
    writeln!(w, "{S4}Quadratic weighted kappa: {:.4}", c.kappa)?;
    write!(w, "{S4}{:<8}", "")?;
    for cat in RiskCategory::ALL {
        write!(w, "{:>9}", cat.name())?;
    }
    for (p, row) in RiskCategory::ALL.iter().zip(c.matrix.iter()) {
        write!(w, "\n{S4}{:<8}", p.name())?;
        for n in row {
            write!(w, "{n:>9}")?;
        }
    }
    Ok(())
}

/// 批处理最终结果.
pub struct BatchResult {
    report: BatchReport,
    scratch: PathBuf,
    concordance: Option<(usize, Concordance)>,
}

impl BatchResult {
    pub fn new(
        report: BatchReport,
        scratch: PathBuf,
        concordance: Option<(usize, Concordance)>,
    ) -> Self {
        Self {
            report,
            scratch,
            concordance,
        }
    }

    /// 批次中是否有失败的受试者.
    #[inline]
    pub fn has_failures(&self) -> bool {
        !self.report.failures.is_empty()
    }

    /// 将汇总写进 `w` 中, 各部分之间以分隔线隔开.
    pub fn write_summary<W: Write>(&self, w: &mut W) -> io::Result<()> {
        utils::sep_to(&mut *w)?;
        describe_into(&self.report, w)?;
        writeln!(w)?;
        if self.has_failures() {
            utils::sep_to(&mut *w)?;
            describe_failures_into(&self.report, w)?;
            writeln!(w)?;
        }
        if let Some((n, c)) = &self.concordance {
            utils::sep_to(&mut *w)?;
            describe_concordance_into(*n, c, w)?;
            writeln!(w)?;
        }
        utils::sep_to(&mut *w)?;
        writeln!(w, "Artifacts written to {}", self.scratch.display())
    }

    /// 在标准输出上打印汇总.
    pub fn analyze(&self) -> io::Result<()> {
        let stdout = io::stdout();
        let mut lock = stdout.lock();
        self.write_summary(&mut lock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cac_berry::pipeline::{Failure, Stage};
    use cac_berry::score::{concordance, ScoreEngine, Weighting};
    use cac_berry::CacError;

    fn report() -> BatchReport {
        let engine = ScoreEngine::default();
        BatchReport {
            records: vec![engine.score("p1", &[]).unwrap()],
            computed: 1,
            resumed: 0,
            filtered: 2,
            failures: vec![Failure::new(
                "p9",
                Stage::Load,
                &CacError::MissingMetadata("p9".to_string()),
            )],
        }
    }

    #[test]
    fn test_summary() {
        let c = concordance(&[(RiskCategory::None, RiskCategory::None)], Weighting::Quadratic);
        let res = BatchResult::new(report(), PathBuf::from("/scratch"), c.map(|c| (1, c)));
        let mut buf = vec![];
        res.write_summary(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();

        assert!(text.contains("Computed: 1"));
        assert!(text.contains("Filtered out: 2"));
        assert!(text.contains("p9 [load] MissingMetadataError"));
        assert!(text.contains("Exact agreement: 1.0000"));
        assert!(text.contains("Mean coronary Agatston: 0.000"));
        assert!(text.ends_with("Artifacts written to /scratch\n"));
    }

    #[test]
    fn test_summary_without_records() {
        let res = BatchResult::new(BatchReport::default(), PathBuf::from("/s"), None);
        let mut buf = vec![];
        res.write_summary(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("Mean coronary Agatston: /"));
        assert!(!text.contains("Failures:"));
        assert!(!text.contains("Concordance"));
    }
}
