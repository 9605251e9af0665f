//! # Models Module Unit Tests / Models 模块单元测试
//!
//! Source classification, naming and the serialized shape of outcome records.
//!
//! 源文件分类、命名以及结果记录的序列化形式。

use std::time::Duration;
use subtest_runner::core::models::{
    BadFileMatch, ExecutionResult, FailureReason, Phase, TestCase, TestKind, VariantRecord, Verdict,
};

#[cfg(test)]
mod test_kind_tests {
    use super::*;

    #[test]
    fn test_classify_source_suffixes() {
        let cases = [
            ("hello.chpl", Some(("hello", TestKind::Compiled))),
            ("api.doc.chpl", Some(("api.doc", TestKind::Doc))),
            ("native.test.c", Some(("native", TestKind::C))),
            ("native.test.cpp", Some(("native", TestKind::Cpp))),
            ("comm.ml-test.c", Some(("comm", TestKind::MultiLocaleC))),
            ("comm.ml-test.cpp", Some(("comm", TestKind::MultiLocaleCpp))),
            ("plain.c", None),
            (".chpl", None),
            ("hello.good", None),
        ];
        for (file, expected) in cases {
            let got = TestKind::classify(file, false);
            let expected = expected.map(|(b, k)| (b.to_string(), k));
            assert_eq!(got, expected, "classifying {file}");
        }
    }

    #[test]
    fn test_doc_compiler_turns_every_source_into_doc() {
        assert_eq!(
            TestKind::classify("hello.chpl", true),
            Some(("hello".to_string(), TestKind::Doc))
        );
        assert_eq!(
            TestKind::classify("native.test.c", true),
            Some(("native".to_string(), TestKind::C))
        );
    }

    #[test]
    fn test_kind_predicates() {
        assert!(TestKind::C.is_c_family());
        assert!(!TestKind::MultiLocaleC.is_c_family());
        assert!(TestKind::MultiLocaleCpp.is_multilocale_only());
        assert!(TestKind::MultiLocaleC.is_native());
        assert!(!TestKind::Compiled.is_native());
        assert_eq!(TestKind::Cpp.language(), "c++");
        assert_eq!(TestKind::Doc.language(), "chpl");
    }
}

#[cfg(test)]
mod record_tests {
    use super::*;

    fn record(verdict: Verdict) -> VariantRecord {
        VariantRecord {
            directory: "types/string".to_string(),
            test: "concat".to_string(),
            phase: Phase::Execute,
            compile_num: 1,
            exec_num: 2,
            trial: 1,
            verdict,
            future: None,
            bad_file: None,
            elapsed_secs: 0.5,
        }
    }

    #[test]
    fn test_qualified_name() {
        let case = TestCase::new("concat.chpl", "concat", TestKind::Compiled);
        assert_eq!(case.qualified_name("types/string"), "types/string/concat");
        assert_eq!(case.qualified_name(""), "concat");
    }

    #[test]
    fn test_verdict_helpers() {
        assert!(!Verdict::Passed.is_failure());
        assert!(Verdict::failed(FailureReason::DiffMismatch).is_failure());
        assert!(Verdict::failed(FailureReason::ExecTimeout).is_timeout());
        assert!(Verdict::failed(FailureReason::CompileTimeout).is_timeout());
        assert!(!Verdict::failed(FailureReason::KnownInfrastructure).is_timeout());
    }

    #[test]
    fn test_execution_result_success() {
        let result = ExecutionResult {
            output: b"ok\n".to_vec(),
            exit_code: Some(0),
            elapsed: Duration::from_millis(10),
            timed_out: false,
        };
        assert!(result.success());
        assert_eq!(result.output_text(), "ok\n");

        let timed_out = ExecutionResult {
            timed_out: true,
            ..result.clone()
        };
        assert!(!timed_out.success());
        let signalled = ExecutionResult {
            exit_code: None,
            ..result
        };
        assert!(!signalled.success());
    }

    #[test]
    fn test_failed_record_serialization() {
        let mut rec = record(Verdict::Failed {
            reason: FailureReason::DiffMismatch,
            annotation: Some("compopts: 1".to_string()),
        });
        rec.future = Some("Future (bug: 123) ".to_string());
        rec.bad_file = Some(BadFileMatch::Clean);

        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["phase"], "execute");
        assert_eq!(json["verdict"]["status"], "failed");
        assert_eq!(json["verdict"]["reason"], "diff-mismatch");
        assert_eq!(json["verdict"]["annotation"], "compopts: 1");
        assert_eq!(json["bad_file"], "clean");
    }

    #[test]
    fn test_optional_fields_are_omitted() {
        let json = serde_json::to_value(record(Verdict::Passed)).unwrap();
        assert_eq!(json["verdict"]["status"], "passed");
        assert!(json.get("future").is_none());
        assert!(json.get("bad_file").is_none());

        let skipped = serde_json::to_string(&record(Verdict::Skipped {
            reason: "notest".to_string(),
        }))
        .unwrap();
        let back: VariantRecord = serde_json::from_str(&skipped).unwrap();
        assert_eq!(
            back.verdict,
            Verdict::Skipped {
                reason: "notest".to_string()
            }
        );
    }

    #[test]
    fn test_display_names_variant() {
        let text = record(Verdict::Passed).to_string();
        assert!(text.starts_with("types/string/concat [Execute 1-2 #1]"));
    }
}
