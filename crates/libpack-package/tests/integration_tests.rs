use libpack_package::*;
use pretty_assertions::assert_eq;
use serde_json::json;

fn targets() -> Vec<ExportTarget> {
    vec![
        ExportTarget::new(
            ".",
            ConditionalExport::new("./index.d.ts", "./fesm2022/my-lib.mjs"),
        ),
        ExportTarget::new(
            "./testing",
            ConditionalExport::new("./testing/index.d.ts", "./fesm2022/my-lib-testing.mjs"),
        ),
    ]
}

mod export_generation {
    use super::*;
    #[allow(unused_imports)]
    use pretty_assertions::assert_eq;

    #[test]
    fn test_generate_without_declared_exports() {
        let (exports, conflicts) = ExportMap::generate(None, &targets());

        assert!(conflicts.is_empty());
        assert_eq!(
            serde_json::to_value(&exports).unwrap(),
            json!({
                "./package.json": { "default": "./package.json" },
                ".": { "types": "./index.d.ts", "default": "./fesm2022/my-lib.mjs" },
                "./testing": {
                    "types": "./testing/index.d.ts",
                    "default": "./fesm2022/my-lib-testing.mjs"
                }
            })
        );
    }

    #[test]
    fn test_generation_is_idempotent() {
        let declared: ExportMap =
            serde_json::from_value(json!({ "./styles": { "sass": "./styles/index.scss" } })).unwrap();

        let (first, _) = ExportMap::generate(Some(&declared), &targets());
        let (second, _) = ExportMap::generate(Some(&declared), &targets());
        assert_eq!(first, second);

        let (again, conflicts) = ExportMap::generate(Some(&first), &targets());
        assert_eq!(again, first);
        assert_eq!(conflicts.len(), 5);
    }

    #[test]
    fn test_declared_conditions_win_and_keep_position() {
        let declared: ExportMap = serde_json::from_value(json!({
            ".": { "default": "./custom.mjs" },
            "./package.json": "./package.json"
        }))
        .unwrap();

        let (exports, conflicts) = ExportMap::generate(Some(&declared), &targets());

        assert_eq!(
            exports.subpaths().collect::<Vec<_>>(),
            vec![".", "./package.json", "./testing"]
        );
        assert_eq!(exports.condition(".", "default"), Some(&json!("./custom.mjs")));
        assert_eq!(exports.condition(".", "types"), Some(&json!("./index.d.ts")));
        assert_eq!(
            conflicts
                .iter()
                .map(|c| (c.subpath.as_str(), c.condition.as_str()))
                .collect::<Vec<_>>(),
            vec![("./package.json", "default"), (".", "default")]
        );
    }

    #[test]
    fn test_conflict_between_entry_points_keeps_first() {
        let duplicated = vec![
            ExportTarget::new(".", ConditionalExport::new("./a.d.ts", "./a.mjs")),
            ExportTarget::new(".", ConditionalExport::new("./b.d.ts", "./b.mjs")),
        ];

        let (exports, conflicts) = ExportMap::generate(None, &duplicated);

        assert_eq!(exports.condition(".", "default"), Some(&json!("./a.mjs")));
        assert_eq!(conflicts.len(), 2);
        assert!(conflicts[0].to_string().contains("\"types\" condition is already set"));
    }
}

mod manifest_round_trip {
    use super::*;
    #[allow(unused_imports)]
    use pretty_assertions::assert_eq;

    #[test]
    fn test_serialized_manifest_snapshot() {
        let mut manifest = PackageJson::from_str(
            r#"{
  "name": "my-lib",
  "version": "1.0.0",
  "license": "MIT",
  "peerDependencies": { "tslib": "^2.0.0", "@angular/core": "^17.0.0" },
  "devDependencies": { "jest": "^29" },
  "libpack": { "package": { "dest": "dist" } }
}"#,
        )
        .unwrap();

        manifest.ensure_compat_shim("tslib", Some("^2.3.0"));
        manifest.strip_tooling_fields();
        manifest.module = Some("fesm2022/my-lib.mjs".to_string());
        manifest.typings = Some("index.d.ts".to_string());
        manifest.side_effects = Some(SideEffects::default());

        insta::assert_snapshot!(manifest.to_string_pretty().unwrap(), @r###"
        {
          "name": "my-lib",
          "version": "1.0.0",
          "module": "fesm2022/my-lib.mjs",
          "typings": "index.d.ts",
          "sideEffects": false,
          "dependencies": {
            "tslib": "^2.0.0"
          },
          "peerDependencies": {
            "@angular/core": "^17.0.0"
          },
          "license": "MIT"
        }
        "###);
    }

    #[test]
    fn test_invalid_manifest_is_a_parse_error() {
        assert!(matches!(
            PackageJson::from_str("{ \"exports\": 3 }"),
            Err(PackageError::ParseError(_))
        ));
    }
}

mod dependency_policy {
    use super::*;
    #[allow(unused_imports)]
    use pretty_assertions::assert_eq;

    #[test]
    fn test_policy_rejects_left_pad() {
        let manifest =
            PackageJson::from_str(r#"{ "dependencies": { "left-pad": "^1.0.0" } }"#).unwrap();
        let policy = DependencyPolicy::new("tslib", ["^rxjs$"]);

        let error = policy.check(&manifest).unwrap_err();
        assert_eq!(
            error,
            ValidationError::DependencyNotAllowed {
                dependency: "left-pad".to_string()
            }
        );
    }

    #[test]
    fn test_injected_shim_passes_policy() {
        let mut manifest = PackageJson::default();
        manifest.ensure_compat_shim("tslib", Some("^2.3.0"));

        assert!(DependencyPolicy::new("tslib", Vec::<String>::new())
            .check(&manifest)
            .is_ok());
    }
}

mod watch_versions {
    use super::*;
    #[allow(unused_imports)]
    use pretty_assertions::assert_eq;

    #[test]
    fn test_successive_versions_strictly_increase() {
        let clock = WatchVersionClock::new();
        let versions: Vec<i64> = (0..50)
            .map(|_| parse_watch_stamp(&clock.next()).unwrap())
            .collect();

        assert!(versions.windows(2).all(|pair| pair[0] < pair[1]));
    }
}
