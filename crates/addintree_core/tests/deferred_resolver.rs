use addintree_core::{
    parse_addin, AddInTree, BuildItemArgs, BuiltItem, ConditionEvaluator, Doozer, DoozerError,
    EvaluatorError, LeafCondition, Module, ModuleLoadError, ModuleLoader, StaticModule,
    StaticModuleLoader,
};
use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};

const DESCRIPTOR: &str = r#"<AddIn name="Menus">
    <Runtime>
        <Import module="menus">
            <Doozer name="Item" class="LabelDoozer"/>
            <Doozer name="Ghost" class="MissingDoozer"/>
            <ConditionEvaluator name="Always" class="AlwaysEvaluator"/>
        </Import>
        <Import module="absent">
            <Doozer name="Remote" class="RemoteDoozer"/>
        </Import>
    </Runtime>
    <Path name="/Menu">
        <Condition name="Always">
            <Item id="Open"/>
        </Condition>
        <Ghost id="Phantom"/>
        <Remote id="Far"/>
        <Item id="Close"/>
    </Path>
</AddIn>"#;

struct Label(&'static str);

impl Doozer for Label {
    fn build_item(&self, args: BuildItemArgs<'_>) -> Result<Option<BuiltItem>, DoozerError> {
        Ok(Some(Box::new(format!("{}{}", self.0, args.codon().id))))
    }
}

struct Always;

impl ConditionEvaluator for Always {
    fn is_valid(
        &self,
        _caller: &dyn Any,
        _condition: &LeafCondition,
    ) -> Result<bool, EvaluatorError> {
        Ok(true)
    }
}

/// Holds the first evaluation until the test releases it.
struct Gate {
    armed: AtomicBool,
    entered: Barrier,
    release: Barrier,
}

impl Gate {
    fn new() -> Self {
        Self {
            armed: AtomicBool::new(true),
            entered: Barrier::new(2),
            release: Barrier::new(2),
        }
    }
}

impl ConditionEvaluator for Gate {
    fn is_valid(
        &self,
        _caller: &dyn Any,
        _condition: &LeafCondition,
    ) -> Result<bool, EvaluatorError> {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.entered.wait();
            self.release.wait();
        }
        Ok(true)
    }
}

/// Counts `load` and doozer construction calls.
struct CountingLoader {
    inner: StaticModuleLoader,
    loads: Arc<AtomicUsize>,
}

impl ModuleLoader for CountingLoader {
    fn load(&self, module_ref: &str) -> Result<Arc<dyn Module>, ModuleLoadError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.inner.load(module_ref)
    }
}

struct Counters {
    loads: Arc<AtomicUsize>,
    constructed: Arc<AtomicUsize>,
}

fn counting_tree() -> (AddInTree, Counters) {
    let loads = Arc::new(AtomicUsize::new(0));
    let constructed = Arc::new(AtomicUsize::new(0));
    let built = Arc::clone(&constructed);
    let module = StaticModule::new()
        .with_doozer("LabelDoozer", move || {
            built.fetch_add(1, Ordering::SeqCst);
            Label("")
        })
        .with_condition_evaluator("AlwaysEvaluator", || Always);
    let loader = CountingLoader {
        inner: StaticModuleLoader::new().with_module("menus", module),
        loads: Arc::clone(&loads),
    };

    let tree = AddInTree::with_loader(Arc::new(loader));
    tree.register(parse_addin(DESCRIPTOR).expect("descriptor should parse"));
    (tree, Counters { loads, constructed })
}

#[test]
fn registration_loads_nothing() {
    let (tree, counters) = counting_tree();
    assert!(tree.has_doozer("Item"));
    assert!(tree.has_condition_evaluator("Always"));
    assert_eq!(counters.loads.load(Ordering::SeqCst), 0);
    assert_eq!(counters.constructed.load(Ordering::SeqCst), 0);
}

#[test]
fn deferred_factories_resolve_once_across_builds() {
    let (tree, counters) = counting_tree();

    for _ in 0..3 {
        let items: Vec<String> = tree.build_items("/Menu", &());
        assert_eq!(items, vec!["Open", "Close"]);
    }

    // `menus` once, `absent` once.
    assert_eq!(counters.loads.load(Ordering::SeqCst), 2);
    assert_eq!(counters.constructed.load(Ordering::SeqCst), 1);
}

#[test]
fn deferred_factories_resolve_once_across_threads() {
    let (tree, counters) = counting_tree();

    std::thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| {
                let items: Vec<String> = tree.build_items("/Menu", &());
                assert_eq!(items, vec!["Open", "Close"]);
            });
        }
    });

    assert_eq!(counters.loads.load(Ordering::SeqCst), 2);
    assert_eq!(counters.constructed.load(Ordering::SeqCst), 1);
}

#[test]
fn readers_only_see_whole_registrations() {
    const WRITERS: usize = 4;
    const ADDINS_PER_WRITER: usize = 5;
    const CODONS_PER_ADDIN: usize = 2;
    // Open, Phantom, Far and Close; only Open and Close build.
    const BASE_CODONS: usize = 4;
    const BASE_ITEMS: usize = 2;

    let (tree, _counters) = counting_tree();

    std::thread::scope(|scope| {
        for writer in 0..WRITERS {
            let tree = &tree;
            scope.spawn(move || {
                for n in 0..ADDINS_PER_WRITER {
                    let text = format!(
                        r#"<AddIn name="W{writer}N{n}"><Path name="/Menu">
                            <Item id="W{writer}N{n}a"/>
                            <Item id="W{writer}N{n}b"/>
                        </Path></AddIn>"#
                    );
                    tree.register(parse_addin(&text).expect("writer descriptor"));
                    tree.register_doozer("Item", Arc::new(Label("")));
                }
            });
        }
        for _ in 0..4 {
            scope.spawn(|| {
                let mut last_codons = 0;
                let mut last_items = 0;
                for _ in 0..50 {
                    let codons = tree.get_path("/Menu").len();
                    assert_eq!((codons - BASE_CODONS) % CODONS_PER_ADDIN, 0);
                    assert!(codons >= last_codons);
                    last_codons = codons;

                    let items: Vec<String> = tree.build_items("/Menu", &());
                    assert_eq!((items.len() - BASE_ITEMS) % CODONS_PER_ADDIN, 0);
                    assert!(items.len() >= last_items);
                    assert_eq!(&items[..BASE_ITEMS], ["Open", "Close"]);
                    last_items = items.len();
                }
            });
        }
    });

    let added = WRITERS * ADDINS_PER_WRITER * CODONS_PER_ADDIN;
    assert_eq!(tree.get_path("/Menu").len(), BASE_CODONS + added);
    assert_eq!(
        tree.build_items::<String>("/Menu", &()).len(),
        BASE_ITEMS + added
    );
}

#[test]
fn failed_resolution_is_cached_and_not_retried() {
    let (tree, counters) = counting_tree();

    assert!(tree.build_item::<String>("/Menu", "Far", &()).is_none());
    assert!(tree.build_item::<String>("/Menu", "Far", &()).is_none());
    assert!(tree.build_item::<String>("/Menu", "Phantom", &()).is_none());
    assert!(tree.build_item::<String>("/Menu", "Phantom", &()).is_none());

    assert_eq!(counters.loads.load(Ordering::SeqCst), 2);
}

#[test]
fn tree_without_loader_only_uses_live_factories() {
    let tree = AddInTree::new();
    tree.register(parse_addin(DESCRIPTOR).expect("descriptor should parse"));

    assert!(tree.build_items::<String>("/Menu", &()).is_empty());

    tree.register_doozer("Item", Arc::new(Label("live:")));
    tree.register_condition_evaluator("Always", Arc::new(Always));
    let items: Vec<String> = tree.build_items("/Menu", &());
    assert_eq!(items, vec!["live:Open", "live:Close"]);
}

#[test]
fn rebinding_a_name_drops_the_cached_instance() {
    let first = StaticModule::new().with_doozer("LabelDoozer", || Label("first:"));
    let second = StaticModule::new().with_doozer("LabelDoozer", || Label("second:"));
    let loader = StaticModuleLoader::new()
        .with_module("first", first)
        .with_module("second", second);
    let tree = AddInTree::with_loader(Arc::new(loader));

    tree.register(
        parse_addin(
            r#"<AddIn name="One">
                <Runtime><Import module="first"><Doozer name="Item" class="LabelDoozer"/></Import></Runtime>
                <Path name="/Menu"><Item id="A"/></Path>
            </AddIn>"#,
        )
        .expect("first descriptor"),
    );
    assert_eq!(tree.build_items::<String>("/Menu", &()), vec!["first:A"]);

    tree.register(
        parse_addin(
            r#"<AddIn name="Two">
                <Runtime><Import module="second"><Doozer name="Item" class="LabelDoozer"/></Import></Runtime>
            </AddIn>"#,
        )
        .expect("second descriptor"),
    );
    assert_eq!(tree.build_items::<String>("/Menu", &()), vec!["second:A"]);
}

#[test]
fn build_in_flight_during_rebind_does_not_pin_the_old_doozer() {
    let first = StaticModule::new().with_doozer("LabelDoozer", || Label("first:"));
    let second = StaticModule::new().with_doozer("LabelDoozer", || Label("second:"));
    let loader = StaticModuleLoader::new()
        .with_module("first", first)
        .with_module("second", second);
    let tree = AddInTree::with_loader(Arc::new(loader));
    let gate = Arc::new(Gate::new());
    let evaluator: Arc<dyn ConditionEvaluator> = gate.clone();
    tree.register_condition_evaluator("Gate", evaluator);

    tree.register(
        parse_addin(
            r#"<AddIn name="One">
                <Runtime><Import module="first"><Doozer name="Item" class="LabelDoozer"/></Import></Runtime>
                <Path name="/Menu"><Condition name="Gate"><Item id="A"/></Condition></Path>
            </AddIn>"#,
        )
        .expect("first descriptor"),
    );

    std::thread::scope(|scope| {
        let parked = scope.spawn(|| tree.build_items::<String>("/Menu", &()));

        gate.entered.wait();
        tree.register(
            parse_addin(
                r#"<AddIn name="Two">
                    <Runtime><Import module="second"><Doozer name="Item" class="LabelDoozer"/></Import></Runtime>
                </AddIn>"#,
            )
            .expect("second descriptor"),
        );
        gate.release.wait();

        let items = parked.join().expect("parked build should finish");
        assert_eq!(items, vec!["first:A"]);
    });

    assert_eq!(tree.build_items::<String>("/Menu", &()), vec!["second:A"]);
}

#[test]
fn static_loader_reports_missing_modules_and_classes() {
    let loader = StaticModuleLoader::new().with_module("menus", StaticModule::new());

    let err = loader.load("absent").err().expect("unknown module must fail");
    assert_eq!(
        err,
        ModuleLoadError::ModuleNotFound {
            module_ref: "absent".to_string()
        }
    );

    let module = loader.load("menus").expect("known module");
    assert!(module.create_doozer("LabelDoozer").is_none());
    assert!(module.create_condition_evaluator("AlwaysEvaluator").is_none());

    let err = ModuleLoadError::ClassNotFound {
        module_ref: "menus".to_string(),
        class_name: "LabelDoozer".to_string(),
    };
    assert_eq!(
        err.to_string(),
        "class `LabelDoozer` not found in module `menus`"
    );
}
