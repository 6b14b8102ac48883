//! Integration tests for SAP Analyzer

use std::path::{Path, PathBuf};
use std::sync::Arc;

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Object, Stream};
use pretty_assertions::assert_eq;
use qpdf::{EncryptionParams, EncryptionParamsR6, PrintPermission, QPdf};
use sap_analyzer::error::ExtractionError;
use sap_analyzer::judge::Criterion;
use sap_analyzer::model::fakes::{uniform_verdict, ScriptedModel};
use sap_analyzer::pdf::PAGE_SEPARATOR;
use sap_analyzer::{run, Error, ExtractorBackend, QuestionSet, RunConfig, TextExtractor};

const PASSWORD: &str = "testpass";

const FIXED_ANSWER: &str = "1. Outcome: Change from baseline in HbA1c at week 26
2. Methods: MMRM with treatment, visit and region
3. Interpretation: A difference of 0.4% is clinically relevant
4. FDA E9 Compliance: Yes, the estimand is pre-specified";

/// Three-page SAP with a primary efficacy section on page 2
fn sap_pages() -> Vec<Vec<&'static str>> {
    vec![
        vec![
            "Statistical Analysis Plan",
            "Protocol ABC-123 Version 2.0",
        ],
        vec![
            "Primary Efficacy Outcome",
            "The primary endpoint is the change from baseline in HbA1c at week 26.",
        ],
        vec![
            "Safety Analysis",
            "Adverse events are coded with MedDRA version 26.0.",
        ],
    ]
}

/// Build a PDF whose pages hold `pages` as one text line per entry
fn build_pdf(pages: &[Vec<&str>]) -> Vec<u8> {
    let mut doc = lopdf::Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for lines in pages {
        let mut operations = Vec::new();
        for (i, line) in lines.iter().enumerate() {
            let y = 720 - 20 * i as i64;
            operations.extend([
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), y.into()]),
                Operation::new("Tj", vec![Object::string_literal(*line)]),
                Operation::new("ET", vec![]),
            ]);
        }
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}

fn encrypt(data: &[u8], password: &str) -> Vec<u8> {
    let pdf = QPdf::read_from_memory(data).unwrap();
    let mut writer = pdf.writer();
    writer
        .preserve_encryption(false)
        .encryption_params(EncryptionParams::R6(EncryptionParamsR6 {
            user_password: password.to_string(),
            owner_password: password.to_string(),
            allow_accessibility: true,
            allow_extract: true,
            allow_assemble: true,
            allow_annotate_and_form: true,
            allow_form_filling: true,
            allow_modify_other: true,
            allow_print: PrintPermission::Full,
            encrypt_metadata: true,
        }));
    writer.write_to_memory().unwrap()
}

fn write_fixture(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, data).unwrap();
    path
}

fn lopdf_extractor() -> TextExtractor {
    TextExtractor::new(ExtractorBackend::Lopdf)
}

fn scripted_model() -> Arc<ScriptedModel> {
    Arc::new(
        ScriptedModel::new()
            .reply_when("Answer:", uniform_verdict(4.0))
            .otherwise(FIXED_ANSWER),
    )
}

// ============================================================================
// Extraction
// ============================================================================

#[test]
fn test_extract_multi_page_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_fixture(dir.path(), "sap.pdf", &build_pdf(&sap_pages()));

    let doc = lopdf_extractor().extract(&path, None).unwrap();

    assert_eq!(doc.page_count, 3);
    assert_eq!(doc.pages.len(), 3);
    assert!(!doc.was_encrypted);
    assert_eq!(doc.backend, ExtractorBackend::Lopdf);
    assert!(doc.pages[0].contains("Statistical Analysis Plan"));
    assert!(doc.pages[1].contains("Primary Efficacy Outcome"));
    assert!(doc.pages[2].contains("MedDRA"));

    // Document text is the page texts in page order
    assert_eq!(doc.text, doc.pages.join(PAGE_SEPARATOR));
    let first = doc.text.find("Protocol ABC-123").unwrap();
    let second = doc.text.find("change from baseline").unwrap();
    let third = doc.text.find("Adverse events").unwrap();
    assert!(first < second && second < third);
}

#[test]
fn test_extract_lines_within_page() {
    let data = build_pdf(&[vec!["Line one", "Line two"]]);
    let doc = lopdf_extractor()
        .extract_bytes(&data, "inline.pdf".to_string(), None)
        .unwrap();
    assert_eq!(doc.text, "Line one\nLine two");
}

#[test]
fn test_encrypted_with_correct_password() {
    let data = encrypt(&build_pdf(&sap_pages()), PASSWORD);

    let doc = lopdf_extractor()
        .extract_bytes(&data, "locked.pdf".to_string(), Some(PASSWORD))
        .unwrap();
    assert!(doc.was_encrypted);
    assert_eq!(doc.page_count, 3);
    assert!(doc.text.contains("Primary Efficacy Outcome"));
}

#[test]
fn test_encrypted_without_password() {
    let data = encrypt(&build_pdf(&sap_pages()), PASSWORD);

    let err = lopdf_extractor()
        .extract_bytes(&data, "locked.pdf".to_string(), None)
        .unwrap_err();
    assert!(
        matches!(err, ExtractionError::PasswordRequired),
        "got {:?}",
        err
    );
}

#[test]
fn test_encrypted_with_wrong_password() {
    let data = encrypt(&build_pdf(&sap_pages()), PASSWORD);

    let err = lopdf_extractor()
        .extract_bytes(&data, "locked.pdf".to_string(), Some("wrong"))
        .unwrap_err();
    assert!(
        matches!(err, ExtractionError::IncorrectPassword),
        "got {:?}",
        err
    );
}

#[test]
fn test_extract_invalid_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_fixture(dir.path(), "notes.pdf", b"plain text, not a PDF");

    let err = lopdf_extractor().extract(&path, None).unwrap_err();
    assert!(matches!(err, ExtractionError::InvalidPdf { .. }));
}

#[test]
fn test_extract_without_text_layer() {
    let data = build_pdf(&[vec![], vec![]]);

    let err = lopdf_extractor()
        .extract_bytes(&data, "scanned.pdf".to_string(), None)
        .unwrap_err();
    match err {
        ExtractionError::NoTextLayer { pages } => assert_eq!(pages, 2),
        other => panic!("expected NoTextLayer, got {:?}", other),
    }
}

// ============================================================================
// Full runs
// ============================================================================

fn run_config(pdf_path: PathBuf, output_dir: PathBuf) -> RunConfig {
    let mut config = RunConfig::new(pdf_path);
    config.output_dir = output_dir;
    config.backend = ExtractorBackend::Lopdf;
    config.interactive = false;
    config
}

fn read_output(path: &Path) -> serde_json::Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[tokio::test]
async fn test_run_writes_session_output() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = write_fixture(dir.path(), "ABC-123_SAP.pdf", &build_pdf(&sap_pages()));
    let out_dir = dir.path().join("output");
    let config = run_config(pdf, out_dir.clone());
    let model = scripted_model();

    let report = run(&config, model.clone(), &b""[..], tokio::io::sink())
        .await
        .unwrap();

    assert_eq!(report.answered, 5);
    assert_eq!(report.failed, 0);
    assert!(report.session.is_none());
    assert!(report.output_path.starts_with(&out_dir));
    let file_name = report.output_path.file_name().unwrap().to_string_lossy();
    assert!(file_name.starts_with("sap_analysis_ABC-123_SAP_"));
    assert!(file_name.ends_with(".json"));

    let output = read_output(&report.output_path);
    assert_eq!(output["run"]["source"], "ABC-123_SAP.pdf");
    assert_eq!(output["run"]["page_count"], 3);
    assert_eq!(output["run"]["model"], "scripted");
    assert_eq!(output["run"]["truncated"], false);

    let results = output["results"].as_object().unwrap();
    assert_eq!(results.len(), 5);
    let primary = &results["primary_efficacy_outcome"];
    assert_eq!(primary["status"], "answered");
    assert_eq!(primary["answer"]["content"], FIXED_ANSWER);
    assert_eq!(primary["evaluation"]["status"], "scored");
    let scores = primary["evaluation"]["scores"].as_object().unwrap();
    assert_eq!(scores.len(), Criterion::ALL.len());
    for criterion in Criterion::ALL {
        assert_eq!(scores[criterion.as_str()]["score"], 4.0);
    }

    // The prompt carried the extracted document
    let calls = model.calls();
    assert!(calls[0].system.contains("Primary Efficacy Outcome"));
}

#[tokio::test]
async fn test_run_with_extended_questions_and_failures() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = write_fixture(dir.path(), "sap.pdf", &build_pdf(&sap_pages()));
    let mut config = run_config(pdf, dir.path().to_path_buf());
    config.analysis.question_set = QuestionSet::Extended;
    let model = Arc::new(
        ScriptedModel::new()
            .reply_when("Answer:", uniform_verdict(2.0))
            .fail_when("Statistical methodology")
            .fail_when("Data integrity")
            .otherwise(FIXED_ANSWER),
    );

    let report = run(&config, model, &b""[..], tokio::io::sink()).await.unwrap();
    assert_eq!(report.answered, 4);
    assert_eq!(report.failed, 2);

    let output = read_output(&report.output_path);
    let results = output["results"].as_object().unwrap();
    assert_eq!(results.len(), 6);
    assert_eq!(results["data_integrity"]["status"], "failed");
    assert_eq!(results["data_integrity"]["error"]["kind"], "model_call");
}

#[tokio::test]
async fn test_run_interactive_after_output() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = write_fixture(dir.path(), "sap.pdf", &build_pdf(&sap_pages()));
    let mut config = run_config(pdf, dir.path().join("out"));
    config.interactive = true;
    let model = scripted_model();

    let mut stdout = Vec::new();
    let report = run(
        &config,
        model.clone(),
        &b"Which coding dictionary is used?\nEXIT\n"[..],
        &mut stdout,
    )
    .await
    .unwrap();

    let session = report.session.unwrap();
    assert_eq!(session.turns, 1);
    assert_eq!(session.answered, 1);
    assert!(report.output_path.exists());
    // five batch questions and one ad-hoc question, each answered and judged
    assert_eq!(model.call_count(), 12);

    let text = String::from_utf8(stdout).unwrap();
    assert!(text.contains(FIXED_ANSWER));
    assert!(text.contains("Goodbye."));
}

#[tokio::test]
async fn test_run_aborts_on_extraction_failure() {
    let dir = tempfile::tempdir().unwrap();
    let data = encrypt(&build_pdf(&sap_pages()), PASSWORD);
    let pdf = write_fixture(dir.path(), "locked.pdf", &data);
    let out_dir = dir.path().join("output");
    let model = scripted_model();

    let err = run(&run_config(pdf, out_dir.clone()), model.clone(), &b""[..], tokio::io::sink())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Extraction(ExtractionError::PasswordRequired)
    ));
    assert_eq!(err.kind(), "extraction");
    assert_eq!(model.call_count(), 0);
    assert!(!out_dir.exists());
}

#[tokio::test]
async fn test_run_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = run_config(dir.path().join("absent.pdf"), dir.path().join("output"));

    let err = run(&config, scripted_model(), &b""[..], tokio::io::sink())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Extraction(ExtractionError::NotFound { .. })
    ));
}
