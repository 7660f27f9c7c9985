use crate::types::{Direction, Objective, TrialRecord};

/// Objective values oriented so that, for every objective, larger is better.
fn maximizing_values(values: &[f64], objectives: &[Objective]) -> Vec<f64> {
    values
        .iter()
        .zip(objectives.iter())
        .map(|(v, o)| if o.direction == Direction::Maximize { *v } else { -*v })
        .collect()
}

fn dominates(a: &[f64], b: &[f64]) -> bool {
    let mut strictly_better = false;
    for (x, y) in a.iter().zip(b.iter()) {
        if x < y {
            return false;
        }
        if x > y {
            strictly_better = true;
        }
    }
    strictly_better
}

/// Fast non-dominated sort: returns each trial's front index (0 = Pareto
/// front) in the same order as `trials`.
pub fn non_dominated_sort(trials: &[TrialRecord], objectives: &[Objective]) -> Vec<usize> {
    let n = trials.len();
    let oriented: Vec<Vec<f64>> = trials.iter().map(|t| maximizing_values(&t.objective_values, objectives)).collect();

    let mut dominated_by: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut domination_count = vec![0usize; n];
    let mut ranks = vec![0usize; n];

    for i in 0..n {
        for j in 0..n {
            if i == j {
                continue;
            }
            if dominates(&oriented[i], &oriented[j]) {
                dominated_by[i].push(j);
            } else if dominates(&oriented[j], &oriented[i]) {
                domination_count[i] += 1;
            }
        }
    }

    let mut current_front: Vec<usize> = (0..n).filter(|&i| domination_count[i] == 0).collect();
    let mut front_no = 0;
    while !current_front.is_empty() {
        let mut next_front = Vec::new();
        for &i in &current_front {
            ranks[i] = front_no;
            for &j in &dominated_by[i] {
                domination_count[j] -= 1;
                if domination_count[j] == 0 {
                    next_front.push(j);
                }
            }
        }
        current_front = next_front;
        front_no += 1;
    }

    ranks
}

/// Crowding distance within a single front, used by NSGA-II to prefer
/// individuals in sparsely populated regions of objective space.
pub fn crowding_distance(indices: &[usize], trials: &[TrialRecord], objectives: &[Objective]) -> Vec<f64> {
    let n = indices.len();
    let mut distance = vec![0.0_f64; n];
    if n <= 2 {
        return vec![f64::INFINITY; n];
    }

    for obj_idx in 0..objectives.len() {
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| {
            trials[indices[a]].objective_values[obj_idx]
                .partial_cmp(&trials[indices[b]].objective_values[obj_idx])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        distance[order[0]] = f64::INFINITY;
        distance[order[n - 1]] = f64::INFINITY;
        let min_v = trials[indices[order[0]]].objective_values[obj_idx];
        let max_v = trials[indices[order[n - 1]]].objective_values[obj_idx];
        let span = (max_v - min_v).abs();
        if span <= f64::EPSILON {
            continue;
        }
        for k in 1..n - 1 {
            if !distance[order[k]].is_finite() {
                continue;
            }
            let prev = trials[indices[order[k - 1]]].objective_values[obj_idx];
            let next = trials[indices[order[k + 1]]].objective_values[obj_idx];
            distance[order[k]] += (next - prev).abs() / span;
        }
    }

    distance
}

#[cfg(test)]
mod tests {
    use super::*;
    use qre_core::ParamPayload;

    fn trial(values: Vec<f64>) -> TrialRecord {
        TrialRecord {
            trial_number: 0,
            params: ParamPayload::new(),
            objective_values: values,
            constraints_satisfied: true,
            constraint_values: vec![],
            composite_score: None,
            is_pareto_optimal: false,
            dominance_rank: 0,
            pruned: false,
        }
    }

    #[test]
    fn dominated_point_gets_higher_rank() {
        let objectives = vec![Objective { metric: "a".into(), direction: Direction::Maximize }];
        let trials = vec![trial(vec![10.0]), trial(vec![5.0]), trial(vec![10.0])];
        let ranks = non_dominated_sort(&trials, &objectives);
        assert_eq!(ranks[0], 0);
        assert_eq!(ranks[2], 0);
        assert_eq!(ranks[1], 1);
    }
}
