//! 审计记录：每次尝试落盘一份决策 JSON 与一份时间线 JSON（可选 Markdown 报告）
//!
//! 文件名共享同一个时间戳：healing_decision_<ts>.json / execution_timeline_<ts>.json。
//! 同一毫秒内重复写入时追加序号，保证不会覆盖，且按文件名排序即为写入顺序。

use std::path::{Path, PathBuf};

use chrono::Local;

use crate::core::HealError;
use crate::healing::types::{ExecutionTimeline, HealingDecision};

const DECISION_PREFIX: &str = "healing_decision_";
const TIMELINE_PREFIX: &str = "execution_timeline_";
const REPORT_PREFIX: &str = "healing_report_";

/// 一次 emit 写出的文件
#[derive(Debug, Clone)]
pub struct AuditArtifacts {
    pub decision_path: PathBuf,
    pub timeline_path: PathBuf,
    pub report_path: Option<PathBuf>,
}

/// 最近一次落盘的决策与时间线
#[derive(Debug, Clone, Default)]
pub struct LatestArtifacts {
    pub decision: Option<HealingDecision>,
    pub timeline: Option<ExecutionTimeline>,
}

#[derive(Debug, Clone)]
pub struct AuditRecorder {
    dir: PathBuf,
    write_markdown: bool,
}

impl AuditRecorder {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            write_markdown: false,
        }
    }

    pub fn with_markdown(mut self, enabled: bool) -> Self {
        self.write_markdown = enabled;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn emit(
        &self,
        decision: &HealingDecision,
        timeline: &ExecutionTimeline,
    ) -> Result<AuditArtifacts, HealError> {
        std::fs::create_dir_all(&self.dir)?;
        let stamp = self.unique_stamp();

        let decision_path = self.dir.join(format!("{}{}.json", DECISION_PREFIX, stamp));
        std::fs::write(&decision_path, decision.to_json()?)?;

        let timeline_path = self.dir.join(format!("{}{}.json", TIMELINE_PREFIX, stamp));
        std::fs::write(&timeline_path, timeline.to_json()?)?;

        let report_path = if self.write_markdown {
            let path = self.dir.join(format!("{}{}.md", REPORT_PREFIX, stamp));
            std::fs::write(&path, decision.to_markdown())?;
            Some(path)
        } else {
            None
        };

        tracing::info!(
            decision = %decision_path.display(),
            timeline = %timeline_path.display(),
            "Artifacts saved"
        );

        Ok(AuditArtifacts {
            decision_path,
            timeline_path,
            report_path,
        })
    }

    fn unique_stamp(&self) -> String {
        self.unique_stamp_from(Local::now().format("%Y%m%d_%H%M%S_%3f").to_string())
    }

    /// 序号补零，保证按文件名排序与写入顺序一致
    fn unique_stamp_from(&self, base: String) -> String {
        let taken = |stamp: &str| {
            self.dir
                .join(format!("{}{}.json", DECISION_PREFIX, stamp))
                .exists()
        };
        if !taken(&base) {
            return base;
        }
        (1..)
            .map(|n| format!("{}_{:03}", base, n))
            .find(|s| !taken(s))
            .unwrap_or_else(|| base.clone())
    }

    /// 按文件名取最新的决策与时间线；目录不存在时返回空结果
    pub fn latest(&self) -> Result<LatestArtifacts, HealError> {
        if !self.dir.is_dir() {
            return Ok(LatestArtifacts::default());
        }

        let mut decisions = Vec::new();
        let mut timelines = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let name = entry?.file_name().to_string_lossy().to_string();
            if !name.ends_with(".json") {
                continue;
            }
            if name.starts_with(DECISION_PREFIX) {
                decisions.push(name);
            } else if name.starts_with(TIMELINE_PREFIX) {
                timelines.push(name);
            }
        }
        decisions.sort();
        timelines.sort();

        let decision = match decisions.last() {
            Some(name) => Some(serde_json::from_str(&std::fs::read_to_string(
                self.dir.join(name),
            )?)?),
            None => None,
        };
        let timeline = match timelines.last() {
            Some(name) => Some(serde_json::from_str(&std::fs::read_to_string(
                self.dir.join(name),
            )?)?),
            None => None,
        };

        Ok(LatestArtifacts { decision, timeline })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::healing::types::{Evidence, HealingAction, Stage};

    fn decision(summary: &str) -> HealingDecision {
        let mut d = HealingDecision::degraded(Path::new("a.spec.ts"), Evidence::from_log("log"), "x");
        d.failure_summary = summary.to_string();
        d.action_taken = HealingAction::new("a", "b", "swap");
        d
    }

    #[test]
    fn test_emit_creates_dir_and_files() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("nested/artifacts");
        let recorder = AuditRecorder::new(&dir).with_markdown(true);

        let mut timeline = ExecutionTimeline::new();
        timeline.add_step(Stage::Start, "go");
        let artifacts = recorder.emit(&decision("first"), &timeline).unwrap();

        assert!(artifacts.decision_path.exists());
        assert!(artifacts.timeline_path.exists());
        let report = std::fs::read_to_string(artifacts.report_path.unwrap()).unwrap();
        assert!(report.contains("# Healing Report"));

        let stamp = |p: &Path, prefix: &str| {
            p.file_name()
                .unwrap()
                .to_string_lossy()
                .trim_start_matches(prefix)
                .to_string()
        };
        assert_eq!(
            stamp(&artifacts.decision_path, DECISION_PREFIX),
            stamp(&artifacts.timeline_path, TIMELINE_PREFIX)
        );

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&artifacts.decision_path).unwrap()).unwrap();
        assert_eq!(json["failure_type"], "UNKNOWN");
        assert_eq!(json["action_taken"]["fixed_code"], "b");
        assert_eq!(json["verification_passed"], false);
    }

    #[test]
    fn test_rapid_emits_do_not_overwrite_and_latest_wins() {
        let tmp = tempfile::tempdir().unwrap();
        let recorder = AuditRecorder::new(tmp.path());
        let timeline = ExecutionTimeline::new();

        let a = recorder.emit(&decision("first"), &timeline).unwrap();
        let b = recorder.emit(&decision("second"), &timeline).unwrap();
        assert_ne!(a.decision_path, b.decision_path);

        let latest = recorder.latest().unwrap();
        assert_eq!(latest.decision.unwrap().failure_summary, "second");
        assert_eq!(latest.timeline.unwrap().session_id(), timeline.session_id());
    }

    #[test]
    fn test_collision_suffixes_sort_in_write_order() {
        let tmp = tempfile::tempdir().unwrap();
        let recorder = AuditRecorder::new(tmp.path());
        let base = "20260101_120000_000".to_string();

        let mut stamps = Vec::new();
        for _ in 0..12 {
            let stamp = recorder.unique_stamp_from(base.clone());
            std::fs::write(tmp.path().join(format!("{}{}.json", DECISION_PREFIX, stamp)), "{}").unwrap();
            stamps.push(stamp);
        }
        assert_eq!(stamps[0], base);
        assert_eq!(stamps[11], format!("{}_011", base));

        let mut names: Vec<String> = stamps
            .iter()
            .map(|s| format!("{}{}.json", DECISION_PREFIX, s))
            .collect();
        let written = names.clone();
        names.sort();
        assert_eq!(names, written);
    }

    #[test]
    fn test_latest_on_missing_dir() {
        let recorder = AuditRecorder::new("/definitely/not/here/artifacts");
        let latest = recorder.latest().unwrap();
        assert!(latest.decision.is_none());
        assert!(latest.timeline.is_none());
    }
}
