//! Trust hierarchy validation
//!
//! An installation is checked as a whole before any key is generated. Every
//! intermediate's signing reference must resolve to a node of the tree (the
//! root or an intermediate declared before it) or to a keystore that already
//! exists on disk. Labels alone are never trusted: a reference matches a
//! node only when both its keystore path and its label agree.

use crate::artifacts::normalize_path;
use crate::configs::CertificateAuthorityConfiguration;
use crate::error::{CaError, Result};
use std::collections::HashSet;
use std::path::PathBuf;

/// Where an intermediate's signing key comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parent {
    Root,
    /// Index of an earlier intermediate in the same installation
    Intermediate(usize),
    /// A keystore provisioned outside this installation
    External,
}

#[derive(Debug)]
pub struct HierarchyNode<'c> {
    config: &'c CertificateAuthorityConfiguration,
    parent: Parent,
    path_length: u32,
}

impl<'c> HierarchyNode<'c> {
    pub fn config(&self) -> &'c CertificateAuthorityConfiguration {
        self.config
    }

    pub fn label(&self) -> &'c str {
        &self.config.key_label
    }

    pub fn parent(&self) -> Parent {
        self.parent
    }

    /// Number of intermediate levels this CA may sign beneath it
    pub fn path_length(&self) -> u32 {
        self.path_length
    }
}

#[derive(Debug)]
pub struct TrustHierarchy<'c> {
    root: &'c CertificateAuthorityConfiguration,
    intermediates: Vec<HierarchyNode<'c>>,
}

impl<'c> TrustHierarchy<'c> {
    /// Validate an installation and resolve every signing reference.
    ///
    /// Fails with `Configuration` when a node is malformed, two nodes write
    /// the same file, or a signing reference cannot be resolved.
    pub fn build(
        root: &'c CertificateAuthorityConfiguration,
        intermediates: &'c [CertificateAuthorityConfiguration],
    ) -> Result<Self> {
        root.validate_root()?;
        for intermediate in intermediates {
            intermediate.validate_intermediate()?;
        }
        check_distinct_outputs(root, intermediates)?;

        let mut nodes = Vec::with_capacity(intermediates.len());
        for (index, config) in intermediates.iter().enumerate() {
            let parent = resolve_parent(root, intermediates, index)?;
            nodes.push(HierarchyNode {
                config,
                parent,
                path_length: 0,
            });
        }

        // children always follow their parent, so one reverse pass settles
        // every subtree height
        for index in (0..nodes.len()).rev() {
            if let Parent::Intermediate(parent) = nodes[index].parent {
                let height = nodes[index].path_length + 1;
                if nodes[parent].path_length < height {
                    nodes[parent].path_length = height;
                }
            }
        }

        Ok(Self {
            root,
            intermediates: nodes,
        })
    }

    pub fn root(&self) -> &'c CertificateAuthorityConfiguration {
        self.root
    }

    /// Intermediates in installation order; parents precede their children
    pub fn intermediates(&self) -> &[HierarchyNode<'c>] {
        &self.intermediates
    }
}

fn check_distinct_outputs(
    root: &CertificateAuthorityConfiguration,
    intermediates: &[CertificateAuthorityConfiguration],
) -> Result<()> {
    let mut seen: HashSet<PathBuf> = HashSet::new();
    for config in std::iter::once(root).chain(intermediates) {
        for path in [&config.keystore_file_name, &config.certificate_file_name] {
            if !seen.insert(normalize_path(path)) {
                return Err(CaError::Configuration(format!(
                    "'{}' writes {} which another CA in the installation also writes",
                    config.key_label,
                    path.display()
                )));
            }
        }
    }
    Ok(())
}

fn resolve_parent(
    root: &CertificateAuthorityConfiguration,
    intermediates: &[CertificateAuthorityConfiguration],
    index: usize,
) -> Result<Parent> {
    let config = &intermediates[index];
    let Some(signing_key) = config.signing_key.as_ref() else {
        return Err(CaError::Configuration(format!(
            "intermediate '{}' must declare a signing key",
            config.key_label
        )));
    };

    let candidates = std::iter::once((Parent::Root, root)).chain(
        intermediates
            .iter()
            .enumerate()
            .map(|(i, node)| (Parent::Intermediate(i), node)),
    );
    let wanted = normalize_path(&signing_key.keystore_file_name);
    for (parent, node) in candidates {
        if normalize_path(&node.keystore_file_name) != wanted {
            continue;
        }
        if node.key_label != signing_key.label {
            return Err(CaError::Configuration(format!(
                "'{}' expects key '{}' in {}, which holds '{}'",
                config.key_label,
                signing_key.label,
                signing_key.keystore_file_name.display(),
                node.key_label
            )));
        }
        return match parent {
            Parent::Intermediate(i) if i == index => Err(CaError::Configuration(format!(
                "'{}' cannot sign its own certificate",
                config.key_label
            ))),
            Parent::Intermediate(i) if i > index => Err(CaError::Configuration(format!(
                "'{}' is signed by '{}', which is declared after it",
                config.key_label, node.key_label
            ))),
            parent => Ok(parent),
        };
    }

    if signing_key.keystore_file_name.exists() {
        return Ok(Parent::External);
    }
    Err(CaError::Configuration(format!(
        "signing key '{}' for '{}' is not part of the installation and {} does not exist",
        signing_key.label,
        config.key_label,
        signing_key.keystore_file_name.display()
    )))
}
