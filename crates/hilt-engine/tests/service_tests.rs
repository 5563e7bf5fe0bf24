//! Integration tests for rendering views through the service

use std::path::PathBuf;

use hilt_engine::{EngineError, TemplateErrorKind, ViewService};
use minijinja::context;
use tempfile::TempDir;

fn fixtures_path() -> PathBuf {
    PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures"))
}

fn service() -> (TempDir, ViewService) {
    let cache = TempDir::new().unwrap();
    let service =
        ViewService::new([fixtures_path().join("views")], Some(cache.path()), None).unwrap();
    (cache, service)
}

mod rendering {
    use super::*;

    #[test]
    fn test_basic_view() {
        let (_cache, service) = service();
        let output = service.make_view("basic", (), ()).unwrap().render().unwrap();
        assert_eq!(output.trim(), "Hello World!");
    }

    #[test]
    fn test_variables() {
        let (_cache, service) = service();
        let output = service
            .render("variables", context! { name => "John Doe" })
            .unwrap();
        assert_eq!(output.trim(), "Hello John Doe!");
    }

    #[test]
    fn test_view_with_value() {
        let (_cache, service) = service();
        let output = service
            .make_view("variables", (), ())
            .unwrap()
            .with("name", "Ada")
            .render()
            .unwrap();
        assert_eq!(output.trim(), "Hello Ada!");
    }

    #[test]
    fn test_foreach_directive() {
        let (_cache, service) = service();
        let output = service
            .render("list", context! { items => vec!["a", "<b>"] })
            .unwrap();

        assert!(output.contains("<li>a</li>"));
        assert!(output.contains("<li>&lt;b&gt;</li>"));
    }

    #[test]
    fn test_include_directive() {
        let (_cache, service) = service();
        let output = service.render("layout", ()).unwrap();
        assert!(output.contains("Header"));
        assert!(output.contains("Hello World!"));
    }

    #[test]
    fn test_resolved_path() {
        let (_cache, service) = service();
        let view = service.make_view("alias.source", (), ()).unwrap();
        assert_eq!(view.name(), "alias.source");
        assert!(view.path().unwrap().ends_with("alias/source.hilt.html"));
    }
}

mod directives {
    use super::*;

    #[test]
    fn test_custom_directive() {
        let (_cache, mut service) = service();
        service.register_directive("datetime", |expr| {
            format!(
                "{{% set d = {} %}}{{{{ d.month }}}} {{{{ d.day }}}}, {{{{ d.year }}}}",
                expr
            )
        });

        let birthday = context! { year => 1983, month => "September", day => 28 };
        let output = service
            .render("directive", context! { birthday => birthday })
            .unwrap();
        assert_eq!(output.trim(), "Your birthday is September 28, 1983");
    }

    #[test]
    fn test_component_directive_with_composer() {
        let (_cache, mut service) = service();
        service.register_component_directive("alias.source", "sayHello");
        service
            .register_component("alias.source", |view| {
                view.with("name", "World");
            })
            .unwrap();

        let output = service.render("alias.usage", ()).unwrap();
        assert!(output.contains("Hello World!"));
    }

    #[test]
    fn test_services_sharing_a_cache_keep_their_directives() {
        let cache = TempDir::new().unwrap();
        let views = TempDir::new().unwrap();
        std::fs::write(views.path().join("stamp.hilt.html"), "@stamp").unwrap();

        let mut one = ViewService::new([views.path()], Some(cache.path()), None).unwrap();
        let mut two = ViewService::new([views.path()], Some(cache.path()), None).unwrap();
        one.register_directive("stamp", |_| "one".to_string());
        two.register_directive("stamp", |_| "two".to_string());

        assert_eq!(one.render("stamp", ()).unwrap(), "one");
        assert_eq!(two.render("stamp", ()).unwrap(), "two");
        assert_eq!(one.render("stamp", ()).unwrap(), "one");
    }
}

mod composers {
    use super::*;

    #[test]
    fn test_composer_injects_data() {
        let (_cache, mut service) = service();
        service
            .register_component("variables", |view| {
                view.with("name", "John Doe");
            })
            .unwrap();

        let output = service.make_view("variables", (), ()).unwrap().render().unwrap();
        assert_eq!(output.trim(), "Hello John Doe!");
    }

    #[test]
    fn test_composer_bound_to_several_patterns() {
        let (_cache, mut service) = service();
        service
            .register_component(["basic", "alias.*"], |view| {
                view.with("name", "ignored");
            })
            .unwrap();

        assert_eq!(service.render("basic", ()).unwrap().trim(), "Hello World!");
    }

    #[test]
    fn test_composer_runs_for_included_view() {
        let (_cache, mut service) = service();
        service
            .register_component("include.inner", |view| {
                view.with("name", "World");
            })
            .unwrap();

        assert_eq!(service.render("include.outer", ()).unwrap(), "[Hi World]");
    }

    #[test]
    fn test_included_view_sees_parent_data() {
        let (_cache, service) = service();
        let output = service
            .render("include.outer", context! { name => "Ada" })
            .unwrap();
        assert_eq!(output, "[Hi Ada]");
    }

    #[test]
    fn test_forget_component() {
        let (_cache, mut service) = service();
        let ids = service
            .register_component("variables", |view| {
                view.with("name", "John Doe");
            })
            .unwrap();
        assert!(service.forget_component(ids[0]));

        let err = service.render("variables", ()).unwrap_err();
        assert!(matches!(err, EngineError::Template(_)));
    }
}

mod view_paths {
    use super::*;

    #[test]
    fn test_add_view_path_appends() {
        let (_cache, mut service) = service();
        service.add_view_path(fixtures_path().join("extra-views"), false);

        let paths = service.view_paths();
        assert_eq!(paths.len(), 2);
        assert_eq!(paths[1], fixtures_path().join("extra-views"));
        assert_eq!(service.render("extra", ()).unwrap().trim(), "Hello Extra!");
    }

    #[test]
    fn test_add_view_path_prepends() {
        let (_cache, mut service) = service();
        service.add_view_path(fixtures_path().join("extra-views"), true);

        assert_eq!(service.view_paths()[0], fixtures_path().join("extra-views"));
    }

    #[test]
    fn test_extra_paths_are_not_kept() {
        let (_cache, service) = service();

        let output = service
            .make_view_with_paths("extra", (), (), [fixtures_path().join("extra-views")])
            .unwrap()
            .render()
            .unwrap();
        assert_eq!(output.trim(), "Hello Extra!");

        assert_eq!(service.view_paths(), vec![fixtures_path().join("views")]);
        let err = service.make_view("extra", (), ()).unwrap_err();
        assert!(err.is_view_not_found());
    }

    #[test]
    fn test_last_extra_path_takes_precedence() {
        let (cache, service) = service();
        let one = cache.path().join("one");
        let two = cache.path().join("two");
        for (dir, content) in [(&one, "one"), (&two, "two")] {
            std::fs::create_dir_all(dir).unwrap();
            std::fs::write(dir.join("basic.hilt.html"), content).unwrap();
        }

        let render = |paths: [&PathBuf; 2]| {
            service
                .make_view_with_paths("basic", (), (), paths)
                .unwrap()
                .render()
                .unwrap()
        };

        assert_eq!(render([&one, &two]), "two");
        assert_eq!(render([&two, &one]), "one");
    }

    #[test]
    fn test_view_names_stay_inside_search_paths() {
        let (_cache, service) = service();
        let outside = tempfile::Builder::new().prefix("outside").tempdir().unwrap();
        std::fs::write(outside.path().join("secret.hilt.html"), "secret").unwrap();

        let absolute = outside.path().join("secret").to_string_lossy().into_owned();
        let dotted = format!(".{}", absolute.replace('/', "."));

        for name in [&absolute, &dotted] {
            assert!(!service.exists(name));
            let err = service.make_view(name, (), ()).unwrap_err();
            assert!(err.is_view_not_found());
            let err = service
                .make_view_with_paths(name, (), (), [outside.path()])
                .unwrap_err();
            assert!(err.is_view_not_found());
        }
    }
}

mod errors {
    use super::*;

    #[test]
    fn test_view_not_found() {
        let (_cache, service) = service();
        let err = service.make_view("missing", (), ()).unwrap_err();

        assert!(err.is_view_not_found());
        assert_eq!(err.to_string(), "View [missing] not found");
    }

    #[test]
    fn test_view_name_typo_is_suggested() {
        let (_cache, service) = service();
        let err = service.make_view("alias.usge", (), ()).unwrap_err();

        match err {
            EngineError::ViewNotFound { suggestion, .. } => {
                assert_eq!(suggestion.as_deref(), Some("Did you mean `alias.usage`?"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_undefined_variable_is_source_mapped() {
        let (_cache, service) = service();
        let err = service.render("broken", context! { name => "x" }).unwrap_err();

        let err = match err {
            EngineError::Template(err) => err,
            other => panic!("expected template error, got {other}"),
        };
        assert_eq!(err.kind(), TemplateErrorKind::UndefinedVariable);
        assert_eq!(err.view, "broken");
        assert_eq!(err.line, Some(3));
        assert!(err.path.unwrap().ends_with("broken.hilt.html"));
        assert_eq!(err.suggestion.as_deref(), Some("Did you mean `name`?"));
    }

    #[test]
    fn test_uncreatable_cache_path() {
        let root = TempDir::new().unwrap();
        let file = root.path().join("file");
        std::fs::write(&file, "").unwrap();

        let err = ViewService::new(
            [fixtures_path().join("views")],
            Some(file.join("cache").as_path()),
            None,
        )
        .unwrap_err();

        assert!(err.is_configuration());
        assert!(err.to_string().contains("file/cache"));
    }
}
