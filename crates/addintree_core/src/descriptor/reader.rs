//! Recursive-descent reader over the descriptor element tree.
//!
//! The current path and the active condition stack are passed down as plain
//! parameters; entering a `<Condition>` builds a new stack for the subtree
//! instead of pushing onto shared state. Only the path sink is mutable.

use super::{DescriptorError, DescriptorResult, SourcePosition};
use crate::model::addin::{AddIn, AddInManifest, AddInReference, Runtime};
use crate::model::codon::{join_path, Codon, ExtensionPath, SUB_CODON_NAME};
use crate::model::condition::{Condition, LeafCondition};
use indexmap::IndexMap;
use roxmltree::{Document, Node};

const MODULE_ATTRIBUTES: &[&str] = &["module", "assembly"];

type PathSink = IndexMap<String, ExtensionPath>;

pub(super) fn read_addin(text: &str) -> DescriptorResult<AddIn> {
    let doc = Document::parse(text)?;
    let root = doc.root_element();
    if root.tag_name().name() != "AddIn" {
        return Err(DescriptorError::UnexpectedRoot {
            found: root.tag_name().name().to_string(),
        });
    }

    let reader = Reader {
        doc: &doc,
        addin_name: root.attribute("name").unwrap_or_default().to_string(),
    };
    let mut addin = AddIn {
        properties: root
            .attributes()
            .map(|attr| (attr.name().to_string(), attr.value().to_string()))
            .collect(),
        ..AddIn::default()
    };

    for child in elements(root) {
        match child.tag_name().name() {
            "Manifest" => reader.read_manifest(child, &mut addin.manifest)?,
            "Runtime" => addin.runtimes.extend(reader.read_runtime(child)?),
            "Path" => {
                let name = reader.required(child, "name")?;
                reader.read_path(child, name, &[], &mut addin.paths)?;
            }
            other => return Err(reader.unexpected(child, other, "AddIn")),
        }
    }

    if addin.manifest.identities.is_empty() {
        if let Some(name) = addin.properties.get("name").filter(|name| !name.trim().is_empty()) {
            let version = addin.properties.get("version").cloned();
            addin.manifest.identities.insert(name.clone(), version);
        }
    }
    Ok(addin)
}

struct Reader<'a, 'input> {
    doc: &'a Document<'input>,
    addin_name: String,
}

impl<'a, 'input> Reader<'a, 'input> {
    fn read_manifest(
        &self,
        node: Node<'a, 'input>,
        manifest: &mut AddInManifest,
    ) -> DescriptorResult<()> {
        for child in elements(node) {
            match child.tag_name().name() {
                "Identity" => {
                    let name = self.required(child, "name")?;
                    manifest
                        .identities
                        .insert(name.to_string(), child.attribute("version").map(str::to_string));
                }
                "Dependency" => {
                    let name = self.required(child, "addin")?;
                    manifest.dependencies.push(AddInReference {
                        name: name.to_string(),
                        version: child.attribute("version").map(str::to_string),
                    });
                }
                other => return Err(self.unexpected(child, other, "Manifest")),
            }
        }
        Ok(())
    }

    fn read_runtime(&self, node: Node<'a, 'input>) -> DescriptorResult<Vec<Runtime>> {
        let mut runtimes = Vec::new();
        for import in elements(node) {
            let tag = import.tag_name().name();
            if tag != "Import" {
                return Err(self.unexpected(import, tag, "Runtime"));
            }
            let module_ref = MODULE_ATTRIBUTES
                .iter()
                .find_map(|attr| import.attribute(*attr).filter(|value| !value.trim().is_empty()))
                .ok_or_else(|| self.missing(import, "module"))?;

            let mut runtime = Runtime::new(module_ref);
            for declaration in elements(import) {
                let tag = declaration.tag_name().name();
                let target = match tag {
                    "Doozer" => &mut runtime.defined_doozers,
                    "ConditionEvaluator" => &mut runtime.defined_condition_evaluators,
                    other => return Err(self.unexpected(declaration, other, "Import")),
                };
                let name = self.required(declaration, "name")?;
                let class = self.required(declaration, "class")?;
                target.insert(name.to_string(), class.to_string());
            }
            runtimes.push(runtime);
        }
        Ok(runtimes)
    }

    /// Opens `path` in the sink (fresh condition scope) and reads `node`'s children into it.
    fn read_path(
        &self,
        node: Node<'a, 'input>,
        path: &str,
        conditions: &[Condition],
        sink: &mut PathSink,
    ) -> DescriptorResult<()> {
        sink.entry(path.to_string())
            .or_insert_with(|| ExtensionPath::new(path));
        for child in elements(node) {
            self.read_node(child, path, conditions, sink)?;
        }
        Ok(())
    }

    fn read_node(
        &self,
        node: Node<'a, 'input>,
        path: &str,
        conditions: &[Condition],
        sink: &mut PathSink,
    ) -> DescriptorResult<()> {
        match node.tag_name().name() {
            "Condition" => {
                let scoped = push_condition(conditions, Condition::Leaf(self.read_leaf(node)?));
                for child in elements(node) {
                    self.read_node(child, path, &scoped, sink)?;
                }
                Ok(())
            }
            "ComplexCondition" => {
                let mut children = elements(node);
                let expression = children.next().ok_or_else(|| DescriptorError::InvalidExpression {
                    element: "ComplexCondition".to_string(),
                    reason: "expected a condition expression as first child",
                    position: self.position(node),
                })?;
                let expression = self.read_expression(expression, "ComplexCondition")?;
                let scoped = push_condition(conditions, expression);
                for child in children {
                    self.read_node(child, path, &scoped, sink)?;
                }
                Ok(())
            }
            tag => self.read_codon(node, tag, path, conditions, sink),
        }
    }

    fn read_codon(
        &self,
        node: Node<'a, 'input>,
        tag: &str,
        path: &str,
        conditions: &[Condition],
        sink: &mut PathSink,
    ) -> DescriptorResult<()> {
        let opens_path = tag == SUB_CODON_NAME || elements(node).next().is_some();
        let id = if opens_path {
            self.required(node, "id")?.to_string()
        } else {
            node.attribute("id").unwrap_or_default().to_string()
        };
        if id.contains('/') {
            return Err(DescriptorError::InvalidId {
                element: tag.to_string(),
                id,
                position: self.position(node),
            });
        }

        let codon = Codon {
            name: tag.to_string(),
            id,
            attributes: node
                .attributes()
                .filter(|attr| attr.name() != "id")
                .map(|attr| (attr.name().to_string(), attr.value().to_string()))
                .collect(),
            conditions: conditions.to_vec(),
            addin_name: self.addin_name.clone(),
        };
        let child_path = join_path(path, &codon.id);
        sink.entry(path.to_string())
            .or_insert_with(|| ExtensionPath::new(path))
            .codons
            .push(codon);

        if opens_path {
            // Nested paths start with an empty condition scope.
            self.read_path(node, &child_path, &[], sink)?;
        }
        Ok(())
    }

    fn read_leaf(&self, node: Node<'a, 'input>) -> DescriptorResult<LeafCondition> {
        let name = self.required(node, "name")?;
        Ok(LeafCondition {
            name: name.to_string(),
            attributes: node
                .attributes()
                .filter(|attr| attr.name() != "name")
                .map(|attr| (attr.name().to_string(), attr.value().to_string()))
                .collect(),
        })
    }

    fn read_expression(&self, node: Node<'a, 'input>, parent: &str) -> DescriptorResult<Condition> {
        let tag = node.tag_name().name();
        match tag {
            "Condition" => Ok(Condition::Leaf(self.read_leaf(node)?)),
            "And" | "Or" => {
                let children = self.read_operands(node)?;
                if children.is_empty() {
                    return Err(self.invalid(node, "expected at least one operand"));
                }
                Ok(if tag == "And" {
                    Condition::And { children }
                } else {
                    Condition::Or { children }
                })
            }
            "Not" => {
                let mut operands = self.read_operands(node)?;
                if operands.len() != 1 {
                    return Err(self.invalid(node, "expected exactly one operand"));
                }
                Ok(Condition::Not {
                    child: Box::new(operands.remove(0)),
                })
            }
            other => Err(self.unexpected(node, other, parent)),
        }
    }

    fn read_operands(&self, node: Node<'a, 'input>) -> DescriptorResult<Vec<Condition>> {
        let parent = node.tag_name().name();
        elements(node)
            .map(|child| self.read_expression(child, parent))
            .collect()
    }

    fn required(
        &self,
        node: Node<'a, 'input>,
        attribute: &'static str,
    ) -> DescriptorResult<&'a str> {
        node.attribute(attribute)
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| self.missing(node, attribute))
    }

    fn missing(&self, node: Node<'a, 'input>, attribute: &'static str) -> DescriptorError {
        DescriptorError::MissingAttribute {
            element: node.tag_name().name().to_string(),
            attribute,
            position: self.position(node),
        }
    }

    fn unexpected(&self, node: Node<'a, 'input>, element: &str, parent: &str) -> DescriptorError {
        DescriptorError::UnexpectedElement {
            element: element.to_string(),
            parent: parent.to_string(),
            position: self.position(node),
        }
    }

    fn invalid(&self, node: Node<'a, 'input>, reason: &'static str) -> DescriptorError {
        DescriptorError::InvalidExpression {
            element: node.tag_name().name().to_string(),
            reason,
            position: self.position(node),
        }
    }

    fn position(&self, node: Node<'a, 'input>) -> SourcePosition {
        let pos = self.doc.text_pos_at(node.range().start);
        SourcePosition {
            line: pos.row,
            column: pos.col,
        }
    }
}

/// Returns a new stack with `condition` as the innermost entry.
fn push_condition(conditions: &[Condition], condition: Condition) -> Vec<Condition> {
    let mut scoped = Vec::with_capacity(conditions.len() + 1);
    scoped.push(condition);
    scoped.extend_from_slice(conditions);
    scoped
}

fn elements<'a, 'input>(node: Node<'a, 'input>) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(Node::is_element)
}
