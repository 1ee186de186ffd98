//! Core data models and state machines for chunked NIDS uploads

pub mod chunk;
pub mod error;
pub mod poll;
pub mod session;
pub mod types;

pub use chunk::*;
pub use error::*;
pub use poll::*;
pub use session::*;
pub use types::*;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, NidsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_id_generation() {
        let a = UploadId::generate();
        let b = UploadId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 36);
        assert!(UploadId::new(a.as_str()).is_ok());
    }

    #[test]
    fn test_upload_id_validation() {
        assert!(UploadId::new("abc-123_x").is_ok());

        assert!(UploadId::new("").is_err());
        assert!(UploadId::new("../escape").is_err());
        assert!(UploadId::new("with space").is_err());
    }

    #[test]
    fn test_filename_passthrough() {
        let name = Filename::new("capture (1).pcap").unwrap();
        assert_eq!(name.as_str(), "capture (1).pcap");

        assert!(Filename::new("").is_err());
        assert!(Filename::new("bad\nname").is_err());

        let from_path = Filename::from_path(std::path::Path::new("/tmp/dir/traffic.pcapng")).unwrap();
        assert_eq!(from_path.as_str(), "traffic.pcapng");
        assert!(Filename::from_path(std::path::Path::new("/")).is_err());
    }

    #[test]
    fn test_job_status_wire_format() {
        let status: JobStatus = serde_json::from_str("\"pending\"").unwrap();
        assert_eq!(status, JobStatus::Queued);

        let status: StatusResponse =
            serde_json::from_str(r#"{"job_id": 4, "status": "processing", "filename": "a.pcap"}"#)
                .unwrap();
        assert_eq!(status.status, JobStatus::Processing);
        assert_eq!(status.job_id, Some(JobId(4)));

        assert_eq!(serde_json::to_string(&JobStatus::Completed).unwrap(), "\"completed\"");
        assert!(serde_json::from_str::<JobStatus>("\"exploded\"").is_err());
        assert!("exploded".parse::<JobStatus>().is_err());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
    }

    #[test]
    fn test_merge_request_body() {
        let req = MergeRequest {
            filename: Filename::new("traffic.pcap").unwrap(),
            upload_id: UploadId::new("u-1").unwrap(),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json, serde_json::json!({"filename": "traffic.pcap", "uploadId": "u-1"}));

        let resp: MergeResponse = serde_json::from_str(
            r#"{"job_id": 12, "message": "File uploaded successfully and processing started."}"#,
        )
        .unwrap();
        assert_eq!(resp.job_id, JobId(12));
    }

    #[test]
    fn test_result_with_labelled_ports() {
        let body = r#"{
            "job_id": 9,
            "filename": "traffic.pcap",
            "status": "completed",
            "threats": [
                {"id": 1, "type": "DDoS", "severity": "High", "description": "flood",
                 "confidence": 0.93, "sourceIP": "10.0.0.5", "destinationIP": "10.0.0.1",
                 "port": "80 (HTTP)"},
                {"id": 2, "type": "PortScan", "severity": "Low", "description": "scan",
                 "confidence": 0.4, "port": 22},
                {"id": 3, "type": "Botnet", "severity": "Medium", "description": "beacon",
                 "confidence": 0.6, "sourceIP": null, "port": null}
            ],
            "summary": {"totalThreats": 3, "riskScore": 72, "recommendation": "Block 10.0.0.5"}
        }"#;

        let result: AnalysisResult = serde_json::from_str(body).unwrap();
        assert!(result.validate().is_ok());
        assert_eq!(result.error, None);

        assert_eq!(result.threats[0].port, Some(80));
        assert_eq!(result.threats[0].service.as_deref(), Some("HTTP"));
        assert_eq!(result.threats[1].port, Some(22));
        assert_eq!(result.threats[1].source_ip, None);
        assert_eq!(result.threats[2].port, None);
        assert_eq!(result.summary.risk_score, 72);
    }

    #[test]
    fn test_missing_summary_defaults() {
        let result: AnalysisResult =
            serde_json::from_str(r#"{"job_id": 1, "filename": "a.pcap", "status": "completed"}"#)
                .unwrap();
        assert!(result.threats.is_empty());
        assert_eq!(result.summary.recommendation, NO_ANALYSIS_RECOMMENDATION);
    }

    #[test]
    fn test_out_of_range_values_rejected() {
        let mut result = AnalysisResult::failure(JobId(1), "a.pcap", "x");
        result.summary.risk_score = 101;
        assert!(matches!(result.validate(), Err(NidsError::InvalidResult(_))));

        let body = r#"{"job_id": 1, "filename": "a.pcap", "status": "completed",
            "threats": [{"id": 1, "type": "x", "severity": "Low", "description": "d", "confidence": 1.5}]}"#;
        let result: AnalysisResult = serde_json::from_str(body).unwrap();
        assert!(result.validate().is_err());
    }

    #[test]
    fn test_failure_result() {
        let result = AnalysisResult::failure(JobId(5), "a.pcap", JOB_FAILED_MESSAGE);
        assert_eq!(result.status, JobStatus::Failed);
        assert!(result.threats.is_empty());
        assert_eq!(result.error.as_deref(), Some(JOB_FAILED_MESSAGE));
    }

    #[test]
    fn test_status_text() {
        assert_eq!(
            SessionStatus::Uploading { completed: 0, total: 3 }.status_text(),
            "Uploading in chunks..."
        );
        assert_eq!(
            SessionStatus::Uploading { completed: 2, total: 3 }.status_text(),
            "Uploading... 2/3"
        );
        assert_eq!(
            SessionStatus::Processing { job_id: JobId(1), status: JobStatus::Queued }.status_text(),
            "Processing started..."
        );
        assert_eq!(
            SessionStatus::Processing { job_id: JobId(1), status: JobStatus::Processing }
                .status_text(),
            "processing"
        );
        assert!(SessionStatus::Merging.is_active());
        assert!(!SessionStatus::Aborted { job_id: JobId(1) }.is_active());
    }
}
