use addintree_core::{
    parse_addin, AddIn, AddInTree, BuildItemArgs, BuiltItem, Codon, ConditionEvaluator,
    ContextProperties, Doozer, DoozerError, EvaluatorError, ExtensionPath, LeafCondition,
};
use std::any::Any;
use std::collections::HashSet;
use std::sync::Arc;

/// Builds `label` (or the id) as a `String`.
struct Label;

impl Doozer for Label {
    fn build_item(&self, args: BuildItemArgs<'_>) -> Result<Option<BuiltItem>, DoozerError> {
        let codon = args.codon();
        let text = codon.get("label").unwrap_or(codon.id.as_str()).to_string();
        Ok(Some(Box::new(text)))
    }
}

#[derive(Debug, PartialEq)]
struct Menu {
    id: String,
    children: Vec<String>,
}

/// Wraps the pre-built children of a `Sub` codon.
struct SubMenu;

impl Doozer for SubMenu {
    fn build_item(&self, args: BuildItemArgs<'_>) -> Result<Option<BuiltItem>, DoozerError> {
        let id = args.codon().id.clone();
        let children = args
            .into_sub_items()
            .into_iter()
            .filter_map(|item| item.downcast::<String>().ok().map(|item| *item))
            .collect();
        Ok(Some(Box::new(Menu { id, children })))
    }
}

/// Builds its nested path on demand.
struct Group;

impl Doozer for Group {
    fn build_item(&self, args: BuildItemArgs<'_>) -> Result<Option<BuiltItem>, DoozerError> {
        let children: Vec<String> = args.build_sub_items();
        Ok(Some(Box::new(Menu {
            id: args.codon().id.clone(),
            children,
        })))
    }
}

/// Builds the path it sits in again and reports how many items came back.
struct Reentrant;

impl Doozer for Reentrant {
    fn build_item(&self, args: BuildItemArgs<'_>) -> Result<Option<BuiltItem>, DoozerError> {
        let nested: Vec<String> = args.tree().build_items(args.path(), args.caller());
        let single: Option<String> = args.tree().build_item(args.path(), "Plain", args.caller());
        Ok(Some(Box::new(format!(
            "nested:{}:{}",
            nested.len(),
            single.is_some()
        ))))
    }
}

struct Failing;

impl Doozer for Failing {
    fn build_item(&self, args: BuildItemArgs<'_>) -> Result<Option<BuiltItem>, DoozerError> {
        Err(DoozerError::new(format!("cannot build {}", args.codon().id)))
    }
}

struct Panicking;

impl Doozer for Panicking {
    fn build_item(&self, _args: BuildItemArgs<'_>) -> Result<Option<BuiltItem>, DoozerError> {
        panic!("doozer exploded");
    }
}

struct Hidden;

impl Doozer for Hidden {
    fn build_item(&self, _args: BuildItemArgs<'_>) -> Result<Option<BuiltItem>, DoozerError> {
        Ok(None)
    }
}

/// True when the caller's flag set contains the `flag` attribute.
struct Flag;

impl ConditionEvaluator for Flag {
    fn is_valid(
        &self,
        caller: &dyn Any,
        condition: &LeafCondition,
    ) -> Result<bool, EvaluatorError> {
        let flags = caller
            .downcast_ref::<HashSet<&'static str>>()
            .ok_or_else(|| EvaluatorError::new("caller carries no flags"))?;
        let flag = condition
            .get("flag")
            .ok_or_else(|| EvaluatorError::new("missing `flag`"))?;
        Ok(flags.contains(flag))
    }
}

struct Broken;

impl ConditionEvaluator for Broken {
    fn is_valid(
        &self,
        _caller: &dyn Any,
        _condition: &LeafCondition,
    ) -> Result<bool, EvaluatorError> {
        Err(EvaluatorError::new("broken evaluator"))
    }
}

struct Exploding;

impl ConditionEvaluator for Exploding {
    fn is_valid(
        &self,
        _caller: &dyn Any,
        _condition: &LeafCondition,
    ) -> Result<bool, EvaluatorError> {
        panic!("evaluator exploded");
    }
}

fn tree_with(descriptor: &str) -> AddInTree {
    let tree = AddInTree::new();
    tree.register(parse_addin(descriptor).expect("descriptor should parse"));
    tree.register_doozer("Item", Arc::new(Label));
    tree.register_doozer("Sub", Arc::new(SubMenu));
    tree.register_doozer("Group", Arc::new(Group));
    tree.register_doozer("Failing", Arc::new(Failing));
    tree.register_doozer("Panicking", Arc::new(Panicking));
    tree.register_doozer("Hidden", Arc::new(Hidden));
    tree.register_doozer("Reentrant", Arc::new(Reentrant));
    tree.register_condition_evaluator("Flag", Arc::new(Flag));
    tree.register_condition_evaluator("Broken", Arc::new(Broken));
    tree.register_condition_evaluator("Exploding", Arc::new(Exploding));
    tree
}

fn flags(values: &[&'static str]) -> HashSet<&'static str> {
    values.iter().copied().collect()
}

#[test]
fn builds_items_in_codon_order() {
    let tree = tree_with(
        r#"<AddIn><Path name="/Menu">
            <Item id="Open" label="Open..."/>
            <Item id="Save"/>
        </Path></AddIn>"#,
    );

    let items: Vec<String> = tree.build_items("/Menu", &flags(&[]));
    assert_eq!(items, vec!["Open...", "Save"]);
}

#[test]
fn leaf_condition_gates_items_per_call() {
    let tree = tree_with(
        r#"<AddIn><Path name="/Menu">
            <Item id="Always"/>
            <Condition name="Flag" flag="debug">
                <Item id="Debug"/>
            </Condition>
        </Path></AddIn>"#,
    );

    let released: Vec<String> = tree.build_items("/Menu", &flags(&[]));
    assert_eq!(released, vec!["Always"]);
    let debug: Vec<String> = tree.build_items("/Menu", &flags(&["debug"]));
    assert_eq!(debug, vec!["Always", "Debug"]);
}

#[test]
fn stacked_conditions_must_all_hold() {
    let tree = tree_with(
        r#"<AddIn><Path name="/Menu">
            <Condition name="Flag" flag="a">
                <Condition name="Flag" flag="b">
                    <Item id="Both"/>
                </Condition>
            </Condition>
        </Path></AddIn>"#,
    );

    assert!(tree.build_items::<String>("/Menu", &flags(&["a"])).is_empty());
    assert!(tree.build_items::<String>("/Menu", &flags(&["b"])).is_empty());
    assert_eq!(
        tree.build_items::<String>("/Menu", &flags(&["a", "b"])),
        vec!["Both"]
    );
}

#[test]
fn complex_condition_combines_and_or_not() {
    let tree = tree_with(
        r#"<AddIn><Path name="/Menu">
            <ComplexCondition>
                <And>
                    <Not><Condition name="Flag" flag="readonly"/></Not>
                    <Or>
                        <Condition name="Flag" flag="file"/>
                        <Condition name="Flag" flag="project"/>
                    </Or>
                </And>
                <Item id="Save"/>
            </ComplexCondition>
        </Path></AddIn>"#,
    );

    let build = |set: &[&'static str]| tree.build_items::<String>("/Menu", &flags(set));
    assert!(build(&[]).is_empty());
    assert_eq!(build(&["file"]), vec!["Save"]);
    assert_eq!(build(&["project"]), vec!["Save"]);
    assert!(build(&["file", "readonly"]).is_empty());
}

#[test]
fn failing_evaluators_exclude_only_their_codon() {
    let tree = tree_with(
        r#"<AddIn><Path name="/Menu">
            <Condition name="Broken"><Item id="A"/></Condition>
            <Condition name="Exploding"><Item id="B"/></Condition>
            <Condition name="Unregistered"><Item id="C"/></Condition>
            <Item id="D"/>
        </Path></AddIn>"#,
    );

    let items: Vec<String> = tree.build_items("/Menu", &flags(&[]));
    assert_eq!(items, vec!["D"]);
}

#[test]
fn evaluator_error_from_wrong_caller_type_excludes() {
    let tree = tree_with(
        r#"<AddIn><Path name="/Menu">
            <Condition name="Flag" flag="x"><Item id="A"/></Condition>
            <Item id="B"/>
        </Path></AddIn>"#,
    );

    let items: Vec<String> = tree.build_items("/Menu", &42_u32);
    assert_eq!(items, vec!["B"]);
}

#[test]
fn missing_or_failing_doozers_skip_only_that_codon() {
    let tree = tree_with(
        r#"<AddIn><Path name="/Menu">
            <Item id="First"/>
            <Unknown id="NoDoozer"/>
            <Failing id="Err"/>
            <Panicking id="Boom"/>
            <Hidden id="Soft"/>
            <Item id="Last"/>
        </Path></AddIn>"#,
    );

    let items: Vec<String> = tree.build_items("/Menu", &flags(&[]));
    assert_eq!(items, vec!["First", "Last"]);
}

#[test]
fn sub_codon_receives_built_children() {
    let tree = tree_with(
        r#"<AddIn><Path name="/Menu">
            <Sub id="File">
                <Item id="Open"/>
                <Condition name="Flag" flag="dirty"><Item id="Save"/></Condition>
                <Unknown id="Skipped"/>
            </Sub>
        </Path></AddIn>"#,
    );

    let clean: Vec<Menu> = tree.build_items("/Menu", &flags(&[]));
    assert_eq!(
        clean,
        vec![Menu {
            id: "File".to_string(),
            children: vec!["Open".to_string()],
        }]
    );

    let dirty: Vec<Menu> = tree.build_items("/Menu", &flags(&["dirty"]));
    assert_eq!(dirty[0].children, vec!["Open", "Save"]);
}

#[test]
fn codon_can_build_its_nested_path_on_demand() {
    let tree = tree_with(
        r#"<AddIn><Path name="/Menu">
            <Group id="Edit">
                <Item id="Cut"/>
                <Item id="Paste"/>
            </Group>
        </Path></AddIn>"#,
    );

    let groups: Vec<Menu> = tree.build_items("/Menu", &flags(&[]));
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].id, "Edit");
    assert_eq!(groups[0].children, vec!["Cut", "Paste"]);
}

#[test]
fn doozer_reentering_its_own_path_gets_nothing() {
    let tree = tree_with(
        r#"<AddIn><Path name="/Loop">
            <Reentrant id="Self"/>
            <Item id="Plain"/>
        </Path></AddIn>"#,
    );

    let items: Vec<String> = tree.build_items("/Loop", &flags(&[]));
    assert_eq!(items, vec!["nested:0:false", "Plain"]);

    // The guard is released once the outer build returns.
    let again: Vec<String> = tree.build_items("/Loop", &flags(&[]));
    assert_eq!(again, items);
    let single: Option<String> = tree.build_item("/Loop", "Self", &flags(&[]));
    assert_eq!(single.as_deref(), Some("nested:0:false"));
}

#[test]
fn hand_built_sub_with_separator_id_terminates() {
    let mut sub = Codon::new("Sub", "/");
    sub.addin_name = "Manual".to_string();
    let mut trailing = ExtensionPath::new("/a//");
    trailing.codons.push(sub);
    let mut addin = AddIn::default();
    addin.paths.insert(trailing.path.clone(), trailing);

    let tree = tree_with("<AddIn/>");
    tree.register(addin);

    let menus: Vec<Menu> = tree.build_items("/a//", &flags(&[]));
    assert_eq!(
        menus,
        vec![Menu {
            id: "/".to_string(),
            children: Vec::new(),
        }]
    );
}

#[test]
fn items_of_the_wrong_type_are_dropped() {
    let tree = tree_with(
        r#"<AddIn><Path name="/Mixed">
            <Item id="Text"/>
            <Sub id="Nested"><Item id="Inner"/></Sub>
        </Path></AddIn>"#,
    );

    let strings: Vec<String> = tree.build_items("/Mixed", &flags(&[]));
    assert_eq!(strings, vec!["Text"]);
    let menus: Vec<Menu> = tree.build_items("/Mixed", &flags(&[]));
    assert_eq!(menus.len(), 1);
    assert!(tree.build_items::<u32>("/Mixed", &flags(&[])).is_empty());
}

#[test]
fn build_item_picks_one_codon_by_id() {
    let tree = tree_with(
        r#"<AddIn><Path name="/Menu">
            <Item id="Open" label="Open..."/>
            <Condition name="Flag" flag="debug"><Item id="Trace"/></Condition>
        </Path></AddIn>"#,
    );

    let open: Option<String> = tree.build_item("/Menu", "Open", &flags(&[]));
    assert_eq!(open.as_deref(), Some("Open..."));
    assert!(tree
        .build_item::<String>("/Menu", "Trace", &flags(&[]))
        .is_none());
    assert_eq!(
        tree.build_item::<String>("/Menu", "Trace", &flags(&["debug"]))
            .as_deref(),
        Some("Trace")
    );
    assert!(tree.build_item::<String>("/Menu", "Missing", &flags(&[])).is_none());
    assert!(tree.build_item::<String>("/Nowhere", "Open", &flags(&[])).is_none());
}

#[test]
fn compare_builtin_reads_caller_properties() {
    let tree = tree_with(
        r#"<AddIn><Path name="/Menu">
            <Condition name="Compare" string="${language}" equals="Rust" comparisonType="OrdinalIgnoreCase">
                <Item id="Cargo"/>
            </Condition>
            <Item id="Always"/>
        </Path></AddIn>"#,
    );
    tree.register_builtins();

    let rust = ContextProperties::new().with("language", "rust");
    let items: Vec<String> = tree.build_items("/Menu", &rust);
    assert_eq!(items, vec!["Cargo", "Always"]);

    let other = ContextProperties::new().with("language", "go");
    let items: Vec<String> = tree.build_items("/Menu", &other);
    assert_eq!(items, vec!["Always"]);
}
