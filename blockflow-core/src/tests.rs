#[cfg(test)]
mod tests {
    use crate::rules::{self, RuleInput};
    use crate::*;
    use blockflow_context::{ContextStore, Scope};
    use blockflow_macros::Properties;
    use serde_json::{json, Map, Value};

    #[derive(Default, Properties)]
    struct MaxActivity {
        #[config(mandatory)]
        val: Option<i64>,
        #[input]
        #[output(mandatory)]
        max: Option<i64>,
    }

    #[async_trait]
    impl Activity for MaxActivity {
        async fn run(&mut self, ctx: &mut ActivityContext) -> anyhow::Result<()> {
            let val = self.val.unwrap_or_default();
            self.max = Some(self.max.map_or(val, |max| max.max(val)));
            ctx.set_status(Status::Success);
            Ok(())
        }
    }

    /// Doubles whatever `seed` holds in context.
    #[derive(Default, Properties)]
    struct Doubler {
        #[output]
        doubled: Option<i64>,
    }

    #[async_trait]
    impl Activity for Doubler {
        async fn run(&mut self, ctx: &mut ActivityContext) -> anyhow::Result<()> {
            let seed = ctx.read("seed").await.and_then(|v| v.as_i64()).unwrap_or_default();
            ctx.write("seed", json!(seed * 2)).await?;
            self.doubled = Some(seed * 2);
            ctx.add_callback(vec![StatusMatcher::Success], |_| Ok(()));
            ctx.set_status(Status::Success);
            Ok(())
        }
    }

    fn assert_send<T: Send>(_: &T) {}
    fn assert_sync<T: Sync>() {}

    #[derive(Properties)]
    struct Greeter {
        #[config(default = "hello")]
        greeting: Option<String>,
        #[input(rename = "userName")]
        user: Option<String>,
        #[output]
        message: Option<String>,
    }

    impl Default for Greeter {
        fn default() -> Self {
            Self {
                greeting: Some("preset".to_string()),
                user: None,
                message: None,
            }
        }
    }

    fn config(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn spec(name: &str, group: Group) -> ActivitySpec {
        ActivitySpec::new("b", block_activity_id("b", name), name, "max", group)
    }

    fn record(state: &mut BlockState, name: &str, group: Group, action: Action, status: Status) {
        let mut data = ActivityData::from_spec(&spec(name, group), action);
        data.status = status;
        state.push(data);
    }

    fn input<'a>(spec: &'a ActivitySpec, state: &'a BlockState, mode: Mode) -> RuleInput<'a> {
        RuleInput {
            spec,
            main: None,
            state,
            mode,
            special_activity_id: None,
            special_reached: false,
        }
    }

    #[test]
    fn test_derived_descriptor_table() {
        let activity = MaxActivity::default();
        let properties = activity.properties();
        assert_eq!(properties.len(), 3);
        let val = &properties[0];
        assert_eq!(val.name, "val");
        assert_eq!(val.kind, PropertyKind::Config);
        assert_eq!(val.ty, PropertyType::Integer);
        assert!(val.mandatory);
        assert_eq!(activity.properties_of(PropertyKind::Output).len(), 1);

        let greeter = Greeter::default();
        let user = greeter
            .properties()
            .into_iter()
            .find(|p| p.kind == PropertyKind::Input)
            .unwrap();
        assert_eq!(user.name, "userName");
    }

    #[test]
    fn test_load_config_assigns_and_checks_mandatory() {
        let binder = PropertyBinder::new();
        let mut activity = MaxActivity::default();
        binder
            .load_config(&mut activity, "b-a", &config(&[("val", json!(7))]))
            .unwrap();
        assert_eq!(activity.val, Some(7));

        let mut activity = MaxActivity::default();
        let err = binder
            .load_config(&mut activity, "b-a", &Map::new())
            .unwrap_err();
        assert!(matches!(err, BindError::MissingConfig { .. }));
    }

    #[test]
    fn test_null_config_counts_as_missing() {
        let binder = PropertyBinder::new();
        let mut activity = MaxActivity::default();
        let err = binder
            .load_config(&mut activity, "b-a", &config(&[("val", Value::Null)]))
            .unwrap_err();
        assert!(matches!(err, BindError::MissingConfig { .. }));
    }

    #[test]
    fn test_config_type_mismatch() {
        let binder = PropertyBinder::new();
        let mut activity = MaxActivity::default();
        let err = binder
            .load_config(&mut activity, "b-a", &config(&[("val", json!("seven"))]))
            .unwrap_err();
        assert!(matches!(err, BindError::TypeMismatch { .. }));
    }

    #[test]
    fn test_default_conflicts_with_constructor_value() {
        let binder = PropertyBinder::new();
        let mut greeter = Greeter::default();
        let err = binder
            .load_config(&mut greeter, "b-g", &Map::new())
            .unwrap_err();
        assert!(matches!(err, BindError::DuplicateDefault { .. }));

        let mut greeter = Greeter {
            greeting: None,
            user: None,
            message: None,
        };
        binder.load_config(&mut greeter, "b-g", &Map::new()).unwrap();
        assert_eq!(greeter.greeting.as_deref(), Some("hello"));
    }

    #[test]
    fn test_inputs_are_searched_outward() {
        let mut store = ContextStore::new();
        store.set_on_flow("max", json!(5)).unwrap();
        let binder = PropertyBinder::new();
        let mut activity = MaxActivity::default();
        binder
            .load_inputs(&mut activity, &store, &Scope::activity("b", "b-a"))
            .unwrap();
        assert_eq!(activity.max, Some(5));
    }

    #[test]
    fn test_relaxed_binding_tolerates_missing_mandatory() {
        let binder = PropertyBinder::relaxed(true);
        let mut activity = MaxActivity::default();
        binder
            .load_config(&mut activity, "b-a", &Map::new())
            .unwrap();
        assert_eq!(activity.val, None);
    }

    #[test]
    fn test_outputs_saved_only_on_success() {
        let binder = PropertyBinder::new();
        let mut store = ContextStore::new();
        let activity = MaxActivity {
            val: Some(3),
            max: Some(3),
        };

        let written = binder
            .save_outputs(&activity, Status::Error, &mut store, "b", "b-a")
            .unwrap();
        assert_eq!(written, 0);
        assert!(store.get(&Scope::Flow, "max").is_err());

        binder
            .save_outputs(&activity, Status::Success, &mut store, "b", "b-a")
            .unwrap();
        assert_eq!(store.get(&Scope::activity("b", "b-a"), "max").unwrap(), &json!(3));
        assert_eq!(store.get(&Scope::block("b"), "max").unwrap(), &json!(3));
        assert_eq!(store.get(&Scope::Flow, "max").unwrap(), &json!(3));
    }

    #[test]
    fn test_missing_mandatory_output() {
        let binder = PropertyBinder::new();
        let mut store = ContextStore::new();
        let activity = MaxActivity::default();
        let err = binder
            .save_outputs(&activity, Status::Success, &mut store, "b", "b-a")
            .unwrap_err();
        assert!(matches!(err, BindError::MissingOutput { .. }));
        assert!(binder
            .save_outputs(&activity, Status::Fail, &mut store, "b", "b-a")
            .is_ok());
    }

    #[test]
    fn test_registry_creates_fresh_instances() {
        let mut registry = ActivityRegistry::new();
        registry.register_default::<MaxActivity>("max");
        assert!(registry.contains("max"));
        assert!(registry.create("max").is_ok());
        assert!(matches!(
            registry.create("does-not-exist"),
            Err(RegistryError::UnknownType(_))
        ));
    }

    struct TestModule;

    impl ActivityModule for TestModule {
        fn name(&self) -> &str {
            "tests.max"
        }

        fn register(&self, registry: &mut ActivityRegistry) {
            registry.register_default::<MaxActivity>("max");
        }
    }

    #[test]
    fn test_module_catalog() {
        let mut catalog = ModuleCatalog::new();
        catalog.add(TestModule);
        let mut registry = ActivityRegistry::new();
        catalog.load("tests.max", &mut registry).unwrap();
        assert_eq!(registry.types(), vec!["max"]);
        assert!(matches!(
            catalog.load("tests.other", &mut registry),
            Err(RegistryError::UnknownModule(_))
        ));
    }

    #[tokio::test]
    async fn test_activity_context_read_write_and_callbacks() {
        let shared = ContextStore::new().shared();
        let data = ActivityData::from_spec(&spec("a", Group::MainActivity), Action::Run);
        let mut ctx = ActivityContext::new(&data, shared.clone());
        ctx.write("count", json!(1)).await.unwrap();
        assert_eq!(ctx.read("count").await, Some(json!(1)));
        assert_eq!(
            shared.lock().await.get(&Scope::Flow, "count").unwrap(),
            &json!(1)
        );

        let mut activity = MaxActivity {
            val: Some(2),
            max: None,
        };
        activity.run(&mut ctx).await.unwrap();
        assert_eq!(activity.max, Some(2));
        assert_eq!(ctx.status(), Status::Success);

        ctx.add_callback(vec![StatusMatcher::Success], |_| Ok(()));
        let callbacks = ctx.take_callbacks();
        assert_eq!(callbacks.len(), 1);
        assert!(callbacks[0].should_run(Status::Success));
        assert!(!callbacks[0].should_run(Status::Error));
    }

    #[tokio::test]
    async fn test_context_touching_run_is_send() {
        assert_sync::<ActivityContext>();

        let shared = ContextStore::new().shared();
        let data = ActivityData::from_spec(&spec("d", Group::MainActivity), Action::Run);
        let mut ctx = ActivityContext::new(&data, shared.clone());
        ctx.write("seed", json!(3)).await.unwrap();

        let mut activity = Doubler::default();
        {
            let read = ctx.read("seed");
            assert_send(&read);
            read.await;
        }
        let run = activity.run(&mut ctx);
        assert_send(&run);
        run.await.unwrap();

        assert_eq!(activity.doubled, Some(6));
        assert_eq!(ctx.read("seed").await, Some(json!(6)));
        assert_eq!(ctx.take_callbacks().len(), 1);
    }

    #[test]
    fn test_action_table_per_mode() {
        let state = BlockState::new("b");
        let main = spec("a", Group::MainActivity);
        let swo = spec("s", Group::MainActivity).with_skip_with_outputs(None);

        assert_eq!(rules::action(&input(&main, &state, Mode::Activity)).unwrap(), Action::Run);
        assert_eq!(
            rules::action(&input(&swo, &state, Mode::Activity)).unwrap(),
            Action::SkipWithOutputValues
        );
        assert_eq!(
            rules::action(&input(&swo, &state, Mode::ActivityBlock)).unwrap(),
            Action::SkipWithOutputValues
        );
        assert_eq!(
            rules::action(&input(&main, &state, Mode::ActivityBlock)).unwrap(),
            Action::Run
        );

        let mut in_block = input(&main, &state, Mode::ActivityInBlock);
        assert_eq!(rules::action(&in_block).unwrap(), Action::KeepAsIs);
        in_block.special_activity_id = Some("b-a");
        assert_eq!(rules::action(&in_block).unwrap(), Action::Run);

        let mut rerun = input(&main, &state, Mode::ActivityBlockRerun);
        assert_eq!(rules::action(&rerun).unwrap(), Action::Reuse);
        rerun.special_reached = true;
        assert_eq!(rules::action(&rerun).unwrap(), Action::Run);
    }

    #[test]
    fn test_run_on_activity_status() {
        let mut state = BlockState::new("b");
        record(&mut state, "first", Group::MainActivity, Action::Run, Status::Error);

        let mut clauses = std::collections::BTreeMap::new();
        clauses.insert("first".to_string(), vec![StatusMatcher::Success]);
        let gated = spec("second", Group::MainActivity).with_run_on(RunOn {
            activity_status: Some(clauses),
            ..RunOn::default()
        });
        assert_eq!(
            rules::run_on_verdict(&gated, &state).unwrap(),
            Action::SkipByConfiguration
        );

        let mut clauses = std::collections::BTreeMap::new();
        clauses.insert(rules::PREVIOUS_ACTIVITY.to_string(), vec![StatusMatcher::All]);
        clauses.insert(
            rules::ANY_ACTIVITY.to_string(),
            vec![StatusMatcher::Error],
        );
        let open = spec("third", Group::MainActivity).with_run_on(RunOn {
            activity_status: Some(clauses),
            ..RunOn::default()
        });
        assert_eq!(rules::run_on_verdict(&open, &state).unwrap(), Action::Run);
    }

    #[test]
    fn test_run_on_missing_referent_is_unknown() {
        let state = BlockState::new("b");
        let mut clauses = std::collections::BTreeMap::new();
        clauses.insert(rules::LATEST_ACTIVITY.to_string(), vec![StatusMatcher::Unknown]);
        let spec = spec("a", Group::MainActivity).with_run_on(RunOn {
            activity_status: Some(clauses),
            ..RunOn::default()
        });
        assert_eq!(rules::run_on_verdict(&spec, &state).unwrap(), Action::Run);
    }

    #[test]
    fn test_run_on_clause_placement() {
        let state = BlockState::new("b");
        let main_clause = spec("a", Group::MainActivity).with_run_on(RunOn {
            main_activity_status: Some(vec![StatusMatcher::Success]),
            ..RunOn::default()
        });
        assert!(rules::run_on_verdict(&main_clause, &state).is_err());

        let block_clause = spec("a", Group::AfterActivity).with_run_on(RunOn {
            activity_block_status: Some(vec![StatusMatcher::Success]),
            ..RunOn::default()
        });
        assert!(rules::run_on_verdict(&block_clause, &state).is_err());

        let mut state = BlockState::new("b");
        state.start();
        let after_block = spec("z", Group::AfterBlock).with_run_on(RunOn {
            activity_block_status: Some(vec![StatusMatcher::Fail]),
            ..RunOn::default()
        });
        assert_eq!(
            rules::run_on_verdict(&after_block, &state).unwrap(),
            Action::SkipByConfiguration
        );
    }

    #[test]
    fn test_interrupt_skips_only_leading_groups() {
        let mut state = BlockState::new("b");
        state.interrupted = true;
        let main = spec("a", Group::MainActivity);
        let after = spec("z", Group::AfterBlock);
        assert_eq!(
            rules::base_action(&input(&main, &state, Mode::ActivityBlock)).unwrap(),
            Action::SkipByFramework
        );
        assert_eq!(
            rules::base_action(&input(&after, &state, Mode::ActivityBlock)).unwrap(),
            Action::Run
        );
    }

    #[test]
    fn test_before_activity_looks_ahead_at_main() {
        let mut state = BlockState::new("b");
        record(&mut state, "first", Group::MainActivity, Action::Run, Status::Fail);

        let mut clauses = std::collections::BTreeMap::new();
        clauses.insert("first".to_string(), vec![StatusMatcher::Success]);
        let main = spec("second", Group::MainActivity).with_run_on(RunOn {
            activity_status: Some(clauses),
            ..RunOn::default()
        });
        let before = ActivitySpec::new(
            "b",
            wrap_activity_id("b", "second", "prep"),
            "prep",
            "noop",
            Group::BeforeActivity,
        )
        .with_main("b-second", "second");

        let mut rule_input = input(&before, &state, Mode::ActivityBlock);
        rule_input.main = Some(&main);
        assert_eq!(rules::base_action(&rule_input).unwrap(), Action::SkipByFramework);
    }

    #[test]
    fn test_after_block_necessity() {
        let mut state = BlockState::new("b");
        let after = spec("z", Group::AfterBlock);
        assert_eq!(
            rules::necessity_verdict(&input(&after, &state, Mode::ActivityBlock)).unwrap(),
            Action::Run
        );

        record(&mut state, "setup", Group::BeforeBlock, Action::SkipByFramework, Status::Skipped);
        assert_eq!(
            rules::necessity_verdict(&input(&after, &state, Mode::ActivityBlock)).unwrap(),
            Action::SkipByFramework
        );
    }

    #[test]
    fn test_after_activity_necessity() {
        let mut state = BlockState::new("b");
        record(&mut state, "a", Group::MainActivity, Action::SkipByFramework, Status::Skipped);
        let after = ActivitySpec::new(
            "b",
            wrap_activity_id("b", "a", "check"),
            "check",
            "noop",
            Group::AfterActivity,
        )
        .with_main("b-a", "a");
        assert_eq!(
            rules::necessity_verdict(&input(&after, &state, Mode::ActivityBlock)).unwrap(),
            Action::SkipByFramework
        );
    }

    #[test]
    fn test_next_block_status_table() {
        use rules::next_block_status as next;

        assert_eq!(next(Status::Unknown, Status::Success, false, false), Status::Success);
        assert_eq!(next(Status::Success, Status::Error, false, false), Status::Error);
        assert_eq!(next(Status::Success, Status::Fail, false, false), Status::Fail);
        assert_eq!(next(Status::Success, Status::Skipped, false, false), Status::Success);
        assert_eq!(next(Status::Success, Status::Skipped, true, false), Status::Skipped);
        assert_eq!(next(Status::Success, Status::Aborted, true, false), Status::Aborted);
        assert_eq!(next(Status::Skipped, Status::Success, false, false), Status::Skipped);
        assert_eq!(next(Status::Skipped, Status::Error, false, false), Status::Error);
        assert_eq!(next(Status::Error, Status::Success, false, false), Status::Error);
        assert_eq!(next(Status::Error, Status::Fail, false, false), Status::Fail);
        assert_eq!(next(Status::Success, Status::Success, false, true), Status::Aborted);
    }

    #[test]
    fn test_block_status_monotonic() {
        let outcomes = [
            (Status::Fail, false, false),
            (Status::Success, false, false),
            (Status::Error, true, false),
            (Status::Skipped, false, true),
        ];
        let mut status = Status::Unknown;
        let mut seen_fail = false;
        let mut aborted = false;
        for (activity_status, interrupted, abort) in outcomes {
            aborted |= abort;
            status = rules::next_block_status(status, activity_status, interrupted, aborted);
            seen_fail |= status == Status::Fail;
            if seen_fail {
                assert_eq!(status, Status::Fail);
            }
        }
        assert_eq!(status, Status::Fail);

        let mut status = Status::Success;
        for activity_status in [Status::Success, Status::Error, Status::Skipped] {
            status = rules::next_block_status(status, activity_status, false, true);
            assert_eq!(status, Status::Aborted);
        }
    }

    #[test]
    fn test_continue_on() {
        let main = spec("a", Group::MainActivity);
        assert!(rules::continue_on(&main, Status::Success, Mode::ActivityBlock, Action::Run));
        assert!(rules::continue_on(&main, Status::Skipped, Mode::ActivityBlock, Action::Run));
        assert!(!rules::continue_on(&main, Status::Error, Mode::ActivityBlock, Action::Run));
        assert!(!rules::continue_on(&main, Status::Unknown, Mode::ActivityBlock, Action::Run));
        assert!(rules::continue_on(
            &main,
            Status::Unknown,
            Mode::ActivityInBlock,
            Action::KeepAsIs
        ));

        let tolerant = spec("b", Group::MainActivity).with_continue_on(vec![StatusMatcher::All]);
        assert!(rules::continue_on(&tolerant, Status::Fail, Mode::ActivityBlock, Action::Run));
    }
}
