use super::AuditReport;
use anyhow::Result;

pub fn print_json(report: &AuditReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    println!("{}", json);
    Ok(())
}
