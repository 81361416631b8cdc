//! Visit order of the resources matching one node
//!
//! A resource that consumes a product must run after every resource that
//! produces it. Beyond that, registration order decides, so the same match
//! set always resolves to the same order.

use tracing::debug;

use crate::config::ResourceConfig;
use crate::error::{Error, Result};

/// Resolve the visit order of a match set.
///
/// Returns positions into `resources`. Producer/consumer edges are honored
/// and unrelated resources keep their relative (registration) order. A
/// dependency cycle is a configuration error naming every resource on it.
pub fn visit_order(resources: &[&ResourceConfig]) -> Result<Vec<usize>> {
    let count = resources.len();
    if count < 2 {
        return Ok((0..count).collect());
    }

    // consumers[i]: resources that must run after i
    let mut consumers: Vec<Vec<usize>> = vec![Vec::new(); count];
    let mut in_degree = vec![0usize; count];
    for (producer, resource) in resources.iter().enumerate() {
        for product in resource.products() {
            for (consumer, other) in resources.iter().enumerate() {
                if consumer != producer
                    && other.consumes(product)
                    && !consumers[producer].contains(&consumer)
                {
                    consumers[producer].push(consumer);
                    in_degree[consumer] += 1;
                }
            }
        }
    }

    let mut placed = vec![false; count];
    let mut order = Vec::with_capacity(count);
    while order.len() < count {
        let next = (0..count).find(|i| !placed[*i] && in_degree[*i] == 0);
        let Some(next) = next else {
            return Err(cycle_error(resources, &consumers, &placed));
        };
        placed[next] = true;
        order.push(next);
        for consumer in &consumers[next] {
            in_degree[*consumer] -= 1;
        }
    }

    if order.iter().enumerate().any(|(position, i)| position != *i) {
        debug!(
            order = ?order.iter().map(|i| resources[*i].to_string()).collect::<Vec<_>>(),
            "Reordered visitors by producer/consumer dependencies"
        );
    }
    Ok(order)
}

/// Walk producer edges backwards from an unplaced resource until one repeats
fn cycle_error(resources: &[&ResourceConfig], consumers: &[Vec<usize>], placed: &[bool]) -> Error {
    let producer_of = |consumer: usize| {
        (0..resources.len()).find(|p| !placed[*p] && consumers[*p].contains(&consumer))
    };

    let Some(start) = (0..resources.len()).find(|i| !placed[*i]) else {
        return Error::CircularDependency {
            chain: String::new(),
        };
    };

    let mut trail = vec![start];
    let mut current = start;
    while let Some(producer) = producer_of(current) {
        if let Some(position) = trail.iter().position(|seen| *seen == producer) {
            let mut cycle: Vec<usize> = trail[position..].to_vec();
            cycle.reverse();
            cycle.push(cycle[0]);
            let chain = cycle
                .iter()
                .map(|i| resources[*i].to_string())
                .collect::<Vec<_>>()
                .join("\n  -> ");
            return Error::CircularDependency { chain };
        }
        trail.push(producer);
        current = producer;
    }

    Error::CircularDependency {
        chain: resources[start].to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::NamespaceBindings;
    use crate::visitor::{Capabilities, Visitor};

    struct Named(&'static str);

    impl Visitor for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities::BEFORE
        }
    }

    fn resource(id: usize, name: &'static str, produces: &[&str], consumes: &[&str]) -> ResourceConfig {
        let mut builder = ResourceConfig::builder("x").visitor(Named(name));
        for p in produces {
            builder = builder.produces(p);
        }
        for c in consumes {
            builder = builder.consumes(c);
        }
        builder.build(id, &NamespaceBindings::new()).unwrap()
    }

    fn names(resources: &[&ResourceConfig], order: &[usize]) -> Vec<String> {
        order.iter().map(|i| resources[*i].name().to_string()).collect()
    }

    #[test]
    fn consumers_follow_producers() {
        let b = resource(0, "B", &[], &["x"]);
        let a = resource(1, "A", &["x"], &[]);
        let c = resource(2, "C", &[], &[]);
        let resources = vec![&b, &a, &c];
        let order = visit_order(&resources).unwrap();
        assert_eq!(names(&resources, &order), vec!["A", "B", "C"]);
    }

    #[test]
    fn unrelated_resources_keep_registration_order() {
        let a = resource(0, "A", &[], &[]);
        let b = resource(1, "B", &[], &[]);
        let c = resource(2, "C", &[], &[]);
        let resources = vec![&a, &b, &c];
        assert_eq!(visit_order(&resources).unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn chains_resolve_transitively() {
        let c = resource(0, "C", &[], &["y"]);
        let b = resource(1, "B", &["y"], &["x"]);
        let d = resource(2, "D", &[], &[]);
        let a = resource(3, "A", &["x"], &[]);
        let resources = vec![&c, &b, &d, &a];
        let order = visit_order(&resources).unwrap();
        assert_eq!(names(&resources, &order), vec!["D", "A", "B", "C"]);
    }

    #[test]
    fn self_consumption_is_not_a_cycle() {
        let a = resource(0, "A", &["x"], &["x"]);
        let resources = vec![&a];
        assert_eq!(visit_order(&resources).unwrap(), vec![0]);

        let b = resource(1, "B", &[], &[]);
        let resources = vec![&a, &b];
        assert_eq!(visit_order(&resources).unwrap(), vec![0, 1]);
    }

    #[test]
    fn cycles_are_reported_with_their_chain() {
        let a = resource(0, "A", &["x"], &["y"]);
        let b = resource(1, "B", &["y"], &["x"]);
        let c = resource(2, "C", &[], &[]);
        let resources = vec![&a, &b, &c];
        let err = visit_order(&resources).unwrap_err();
        let Error::CircularDependency { chain } = &err else {
            panic!("expected a circular dependency, got {:?}", err);
        };
        assert!(chain.contains("A (selector 'x')"));
        assert!(chain.contains("B (selector 'x')"));
        assert!(err.is_configuration());
    }
}
