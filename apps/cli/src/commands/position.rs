//! 位置查询命令

use super::connection::Session;
use crate::validation::parse_axes;
use anyhow::Result;
use clap::Args;
use ucp_sdk::DriveUnitOps;

/// 位置查询命令参数
#[derive(Args, Debug)]
pub struct PositionCommand {
    /// 轴号列表（如 1,2,3；默认全部）
    #[arg(short, long, default_value = "all")]
    pub axes: String,

    /// 输出格式（table / json）
    #[arg(short, long, default_value = "table")]
    pub format: String,
}

impl PositionCommand {
    pub fn execute(&self, session: &Session) -> Result<()> {
        let axes = parse_axes(&self.axes)?;
        let units = session.units(&axes)?;

        let mut rows = Vec::with_capacity(units.len());
        for unit in &units {
            // 单轴读取失败不影响其它轴
            let reading = unit
                .get_drive_position()
                .map(|drive| (drive, unit.config().motor().drive_to_joint(unit.axis(), drive)));
            rows.push((unit.axis(), reading));
        }

        if self.format == "json" {
            let json: Vec<serde_json::Value> = rows
                .iter()
                .map(|(axis, reading)| match reading {
                    Ok((drive, joint)) => {
                        serde_json::json!({"axis": axis, "joint_deg": joint, "drive_deg": drive})
                    },
                    Err(e) => serde_json::json!({"axis": axis, "error": e.to_string()}),
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&json)?);
            return Ok(());
        }

        println!("📊 关节位置:");
        for (axis, reading) in &rows {
            match reading {
                Ok((drive, joint)) => println!("  J{axis}: {joint:>9.3}°  (电机端 {drive:.1}°)"),
                Err(e) => println!("  J{axis}: ❌ {e}"),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_command_defaults() {
        let cmd = PositionCommand {
            axes: "all".into(),
            format: "table".into(),
        };
        assert_eq!(parse_axes(&cmd.axes).unwrap().len(), 6);
    }
}
