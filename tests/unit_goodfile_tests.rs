//! # Good-File Resolver Unit Tests / 期望输出文件解析单元测试

use std::collections::HashSet;
use subtest_runner::config::Capabilities;
use subtest_runner::core::goodfile::GoodFileResolver;

fn resolver(no_local: bool) -> GoodFileResolver {
    GoodFileResolver::new("host", "linux64", no_local, &Capabilities::default())
}

fn resolve(r: &GoodFileResolver, existing: &[&str], suffixes: &[&str]) -> String {
    let existing: HashSet<&str> = existing.iter().copied().collect();
    let suffixes: Vec<String> = suffixes.iter().map(|s| s.to_string()).collect();
    r.resolve_with("t", &suffixes, |name| existing.contains(name))
}

#[cfg(test)]
mod candidate_tests {
    use super::*;

    #[test]
    fn test_candidate_order() {
        let candidates = resolver(false).candidates("t", "");
        assert_eq!(
            candidates,
            vec![
                "t.host.good",
                "t.comm-none.na-none.lm-flat.good",
                "t.comm-none.na-none.good",
                "t.comm-none.lm-flat.good",
                "t.comm-none.tasks-none.good",
                "t.na-none.lm-flat.good",
                "t.comm-none.good",
                "t.tasks-none.good",
                "t.na-none.good",
                "t.lm-flat.good",
                "t.linux64.good",
                "t.good",
            ]
        );
    }

    #[test]
    fn test_no_local_candidate_follows_machine() {
        let candidates = resolver(true).candidates("t", ".1-2");
        assert_eq!(candidates[0], "t.host.1-2.good");
        assert_eq!(candidates[1], "t.no-local.1-2.good");
        assert_eq!(candidates.len(), 13);
    }
}

#[cfg(test)]
mod resolution_tests {
    use super::*;

    #[test]
    fn test_most_specific_existing_file_wins() {
        let r = resolver(false);
        assert_eq!(resolve(&r, &["t.good", "t.comm-none.good"], &[""]), "t.comm-none.good");
        assert_eq!(resolve(&r, &["t.good", "t.linux64.good", "t.host.good"], &[""]), "t.host.good");
    }

    #[test]
    fn test_numbered_suffix_beats_machine_specific_bare_file() {
        let r = resolver(false);
        assert_eq!(resolve(&r, &["t.host.good", "t.1-2.good"], &[".1-2", ""]), "t.1-2.good");
    }

    #[test]
    fn test_falls_back_to_bare_suffix_chain() {
        let r = resolver(false);
        assert_eq!(resolve(&r, &["t.linux64.good"], &[".1-2", ""]), "t.linux64.good");
    }

    #[test]
    fn test_nothing_exists_names_last_candidate() {
        let r = resolver(false);
        assert_eq!(resolve(&r, &[], &[".1-2", ""]), "t.good");
        assert_eq!(resolve(&r, &[], &[".1-2"]), "t.1-2.good");
    }

    #[test]
    fn test_resolve_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("t.tasks-none.good"), "x").unwrap();
        let name = resolver(false).resolve_with("t", &[String::new()], |c| dir.path().join(c).is_file());
        assert_eq!(name, "t.tasks-none.good");
    }
}
