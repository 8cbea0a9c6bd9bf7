use std::fmt::Write;

use crate::common::Check;

/// 报告生成接口
///
/// 输入分数和检查项，输出 Markdown 文本。纯函数，不做 IO。
pub trait ReportGenerator: Send + Sync + 'static {
    fn generate(&self, score: u8, checks: &[Check]) -> String;
}

/// 默认的 Markdown 报告
#[derive(Debug, Clone, Default)]
pub struct MarkdownReport;

impl MarkdownReport {
    fn verdict(score: u8) -> &'static str {
        match score {
            90..=u8::MAX => "Production ready",
            70..=89 => "Nearly there",
            _ => "Needs work",
        }
    }
}

impl ReportGenerator for MarkdownReport {
    fn generate(&self, score: u8, checks: &[Check]) -> String {
        let passed = checks.iter().filter(|c| c.enabled).count();

        let mut md = String::new();
        // write! 到 String 不会失败
        let _ = writeln!(md, "# ShipDojo Report");
        let _ = writeln!(md);
        let _ = writeln!(md, "**Score:** {score}/100 ({})", Self::verdict(score));
        let _ = writeln!(md);
        let _ = writeln!(md, "## Dojo Checks ({passed}/{} passed)", checks.len());
        let _ = writeln!(md);
        if checks.is_empty() {
            let _ = writeln!(md, "_No checks configured._");
        }
        for check in checks {
            let mark = if check.enabled { "x" } else { " " };
            let status = if check.enabled { "passed" } else { "skipped" };
            let required = if check.required { " (required)" } else { "" };
            let _ = writeln!(
                md,
                "- [{mark}] **{}**{required}: {} ({status})",
                check.name, check.description
            );
        }
        md
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_every_check_with_status() {
        let checks = vec![
            Check::new("a", "Security scan", "static analysis", true, true),
            Check::new("b", "Documentation", "readme", false, false),
        ];
        let md = MarkdownReport.generate(65, &checks);
        assert!(md.contains("**Score:** 65/100 (Needs work)"));
        assert!(md.contains("(1/2 passed)"));
        assert!(md.contains("- [x] **Security scan** (required): static analysis (passed)"));
        assert!(md.contains("- [ ] **Documentation**: readme (skipped)"));
    }

    #[test]
    fn empty_check_set_still_renders() {
        let md = MarkdownReport.generate(30, &[]);
        assert!(!md.is_empty());
        assert!(md.contains("_No checks configured._"));
    }
}
