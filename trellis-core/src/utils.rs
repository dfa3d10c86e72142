//! Utility functions for the container
//!
//! Naming helpers for default bean names and static checks over the
//! dependency graph.

/// Naming convention utilities for bean names
pub mod naming {
    /// Converts a PascalCase type name to camelCase for bean naming.
    ///
    /// This is the default bean naming strategy, where `UserService`
    /// becomes `userService`.
    ///
    /// # Examples
    ///
    /// ```
    /// use trellis_core::utils::naming::to_camel_case;
    ///
    /// assert_eq!(to_camel_case("UserService"), "userService");
    /// assert_eq!(to_camel_case("A"), "a");
    /// assert_eq!(to_camel_case(""), "");
    /// ```
    pub fn to_camel_case(s: &str) -> String {
        let mut chars = s.chars();
        match chars.next() {
            None => String::new(),
            Some(first) => {
                let mut result = String::with_capacity(s.len());
                result.extend(first.to_lowercase());
                result.push_str(chars.as_str());
                result
            }
        }
    }

    /// Strips the module path and generic arguments from a Rust type name.
    ///
    /// # Examples
    ///
    /// ```
    /// use trellis_core::utils::naming::simple_type_name;
    ///
    /// assert_eq!(simple_type_name("shop::service::OrderService"), "OrderService");
    /// assert_eq!(simple_type_name("shop::Cache<alloc::string::String>"), "Cache");
    /// assert_eq!(simple_type_name("u32"), "u32");
    /// ```
    pub fn simple_type_name(full: &str) -> &str {
        let base = full.split('<').next().unwrap_or(full);
        base.rsplit("::").next().unwrap_or(base)
    }
}

/// Dependency graph utilities
pub mod dependency {
    use std::collections::{HashMap, HashSet};

    /// Errors found by static dependency validation
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum DependencyValidationError {
        MissingDependency { bean: String, missing: String },
        CircularDependency { cycle: Vec<String> },
    }

    impl std::fmt::Display for DependencyValidationError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Self::MissingDependency { bean, missing } => {
                    write!(f, "Bean '{}' depends on undefined bean '{}'", bean, missing)
                }
                Self::CircularDependency { cycle } => {
                    write!(f, "Circular dependency detected: {}", cycle.join(" → "))
                }
            }
        }
    }

    impl std::error::Error for DependencyValidationError {}

    /// Validates dependency graph for circular dependencies and missing beans
    ///
    /// # Arguments
    ///
    /// * `graph` - Bean names with their eager dependencies, in registration order
    ///
    /// # Returns
    ///
    /// Returns Ok(()) if no issues found, or Err with the first detected issue.
    /// Beans are visited in the given order, so the reported issue is stable.
    pub fn validate_dependency_graph(
        graph: &[(String, Vec<String>)],
    ) -> Result<(), DependencyValidationError> {
        let edges: HashMap<&str, &[String]> = graph
            .iter()
            .map(|(bean, deps)| (bean.as_str(), deps.as_slice()))
            .collect();

        for (bean_name, deps) in graph {
            for dep in deps {
                if !edges.contains_key(dep.as_str()) {
                    return Err(DependencyValidationError::MissingDependency {
                        bean: bean_name.clone(),
                        missing: dep.clone(),
                    });
                }
            }
        }

        let mut visited = HashSet::new();
        let mut rec_stack = Vec::new();

        for (bean_name, _) in graph {
            if !visited.contains(bean_name.as_str()) {
                if let Some(cycle) = detect_cycle_dfs(bean_name, &edges, &mut visited, &mut rec_stack)
                {
                    return Err(DependencyValidationError::CircularDependency { cycle });
                }
            }
        }

        Ok(())
    }

    /// DFS-based cycle detection
    ///
    /// Returns Some(cycle) if a cycle is detected, None otherwise
    fn detect_cycle_dfs<'a>(
        node: &'a str,
        graph: &HashMap<&'a str, &'a [String]>,
        visited: &mut HashSet<&'a str>,
        rec_stack: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
        visited.insert(node);
        rec_stack.push(node);

        if let Some(&deps) = graph.get(node) {
            for dep in deps {
                let dep = dep.as_str();
                if let Some(start) = rec_stack.iter().position(|n| *n == dep) {
                    let mut cycle: Vec<String> =
                        rec_stack[start..].iter().map(|n| n.to_string()).collect();
                    cycle.push(dep.to_string());
                    return Some(cycle);
                }
                if !visited.contains(dep) {
                    if let Some(cycle) = detect_cycle_dfs(dep, graph, visited, rec_stack) {
                        return Some(cycle);
                    }
                }
            }
        }

        rec_stack.pop();
        None
    }

    /// Performs topological sort on dependency graph
    ///
    /// Returns bean names in dependency order (dependencies before dependents).
    /// Among beans that are ready at the same time, registration order wins.
    /// Edges to beans outside the graph are ignored.
    ///
    /// # Returns
    ///
    /// Returns Ok(sorted_beans) if successful, or Err(remaining_beans) if there
    /// is a circular dependency
    pub fn topological_sort(graph: &[(String, Vec<String>)]) -> Result<Vec<String>, Vec<String>> {
        let position: HashMap<&str, usize> = graph
            .iter()
            .enumerate()
            .map(|(i, (bean, _))| (bean.as_str(), i))
            .collect();

        let mut in_degree = vec![0usize; graph.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); graph.len()];
        for (i, (_, deps)) in graph.iter().enumerate() {
            for dep in deps {
                if let Some(&j) = position.get(dep.as_str()) {
                    in_degree[i] += 1;
                    dependents[j].push(i);
                }
            }
        }

        let mut ready: std::collections::BTreeSet<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree == 0)
            .map(|(i, _)| i)
            .collect();

        let mut result = Vec::with_capacity(graph.len());
        while let Some(node) = ready.pop_first() {
            result.push(graph[node].0.clone());
            for &dependent in &dependents[node] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }

        if result.len() != graph.len() {
            let remaining = graph
                .iter()
                .enumerate()
                .filter(|(i, _)| in_degree[*i] > 0)
                .map(|(_, (bean, _))| bean.clone())
                .collect();
            return Err(remaining);
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    mod naming_tests {
        use super::super::naming::*;

        #[test]
        fn test_to_camel_case() {
            assert_eq!(to_camel_case("UserService"), "userService");
            assert_eq!(to_camel_case("HTTPClient"), "hTTPClient");
            assert_eq!(to_camel_case("already"), "already");
        }

        #[test]
        fn test_simple_type_name() {
            assert_eq!(simple_type_name("a::b::C"), "C");
            assert_eq!(simple_type_name("a::Wrapper<a::Inner>"), "Wrapper");
        }
    }

    mod dependency_tests {
        use super::super::dependency::*;

        fn graph(edges: &[(&str, &[&str])]) -> Vec<(String, Vec<String>)> {
            edges
                .iter()
                .map(|(bean, deps)| {
                    (
                        bean.to_string(),
                        deps.iter().map(|d| d.to_string()).collect(),
                    )
                })
                .collect()
        }

        #[test]
        fn test_validate_missing_dependency() {
            let g = graph(&[("service", &["repository"])]);
            assert_eq!(
                validate_dependency_graph(&g),
                Err(DependencyValidationError::MissingDependency {
                    bean: "service".into(),
                    missing: "repository".into(),
                })
            );
        }

        #[test]
        fn test_validate_circular_dependency() {
            let g = graph(&[("a", &["b"]), ("b", &["c"]), ("c", &["a"])]);
            match validate_dependency_graph(&g) {
                Err(DependencyValidationError::CircularDependency { cycle }) => {
                    assert_eq!(cycle, vec!["a", "b", "c", "a"]);
                }
                other => panic!("expected cycle, got {:?}", other),
            }
        }

        #[test]
        fn test_validate_valid_graph() {
            let g = graph(&[("service", &["repo", "cache"]), ("repo", &[]), ("cache", &["repo"])]);
            assert!(validate_dependency_graph(&g).is_ok());
        }

        #[test]
        fn test_validate_self_dependency() {
            let g = graph(&[("a", &["a"])]);
            assert!(matches!(
                validate_dependency_graph(&g),
                Err(DependencyValidationError::CircularDependency { .. })
            ));
        }

        #[test]
        fn test_topological_sort_dependencies_first() {
            let g = graph(&[
                ("service", &["repo", "cache"]),
                ("cache", &["repo"]),
                ("repo", &[]),
                ("clock", &[]),
            ]);
            assert_eq!(
                topological_sort(&g).unwrap(),
                vec!["repo", "cache", "service", "clock"]
            );
        }

        #[test]
        fn test_topological_sort_reports_cycle_members() {
            let g = graph(&[("a", &["b"]), ("b", &["a"]), ("c", &[])]);
            assert_eq!(topological_sort(&g).unwrap_err(), vec!["a", "b"]);
        }
    }
}
