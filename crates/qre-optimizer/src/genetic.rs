use qre_core::{ParamPayload, ParamSchema, ParamSpec, ParamType, ParamValue};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::dominance::{crowding_distance, non_dominated_sort};
use crate::sampler::Sampler;
use crate::types::{Objective, TrialRecord};

fn clamp_spec(spec: &ParamSpec, v: f64) -> f64 {
    let min = spec.optimize.min.unwrap_or(f64::NEG_INFINITY);
    let max = spec.optimize.max.unwrap_or(f64::INFINITY);
    let v = v.clamp(min, max);
    if spec.param_type == ParamType::Int {
        v.round()
    } else {
        v
    }
}

fn numeric_specs(schema: &ParamSchema) -> Vec<&ParamSpec> {
    schema
        .specs
        .iter()
        .filter(|s| s.optimize.enabled && matches!(s.param_type, ParamType::Int | ParamType::Float))
        .collect()
}

fn payload_from_genome(schema: &ParamSchema, genome: &[f64]) -> ParamPayload {
    let numeric = numeric_specs(schema);
    let mut idx_by_name: std::collections::HashMap<&str, f64> =
        numeric.iter().zip(genome.iter()).map(|(s, v)| (s.name.as_str(), *v)).collect();

    schema
        .specs
        .iter()
        .map(|s| {
            let v = if s.optimize.enabled {
                match s.param_type {
                    ParamType::Int | ParamType::Float => ParamValue::Number(idx_by_name.remove(s.name.as_str()).unwrap_or(0.0)),
                    _ => s.default.clone(),
                }
            } else {
                s.default.clone()
            };
            (s.name.clone(), v)
        })
        .collect()
}

fn genome_from_payload(schema: &ParamSchema, payload: &ParamPayload) -> Vec<f64> {
    numeric_specs(schema).iter().map(|s| payload.get(&s.name).and_then(ParamValue::as_f64).unwrap_or(0.0)).collect()
}

fn random_genome(schema: &ParamSchema, rng: &mut impl Rng) -> Vec<f64> {
    numeric_specs(schema)
        .iter()
        .map(|s| {
            let min = s.optimize.min.unwrap_or(0.0);
            let max = s.optimize.max.unwrap_or(min + 1.0);
            if max > min {
                rng.gen_range(min..=max)
            } else {
                min
            }
        })
        .collect()
}

fn crossover(a: &[f64], b: &[f64], rng: &mut impl Rng, prob: f64) -> Vec<f64> {
    if !rng.gen_bool(prob) {
        return a.to_vec();
    }
    let point = if a.len() > 1 { rng.gen_range(1..a.len()) } else { 0 };
    a[..point].iter().chain(b[point..].iter()).copied().collect()
}

fn mutate(genome: &mut [f64], schema: &ParamSchema, rng: &mut impl Rng, prob: f64) {
    let specs = numeric_specs(schema);
    for (g, spec) in genome.iter_mut().zip(specs.iter()) {
        if rng.gen_bool(prob) {
            let min = spec.optimize.min.unwrap_or(0.0);
            let max = spec.optimize.max.unwrap_or(min + 1.0);
            let span = max - min;
            *g = clamp_spec(spec, *g + rng.gen_range(-0.1..0.1) * span);
        }
    }
}

/// Shared population-evolution machinery for NSGA-II and NSGA-III: the two
/// differ only in which members of a combined parent+offspring pool survive
/// into the next generation once fronts are ranked.
struct Population {
    genomes: Vec<Vec<f64>>,
    rng: StdRng,
    population_size: usize,
    crossover_prob: f64,
    mutation_prob: f64,
    queue: Vec<Vec<f64>>,
}

impl Population {
    fn new(seed: u64, population_size: usize, crossover_prob: f64, mutation_prob: f64) -> Self {
        Self {
            genomes: Vec::new(),
            rng: StdRng::seed_from_u64(seed),
            population_size: population_size.max(4),
            crossover_prob,
            mutation_prob,
            queue: Vec::new(),
        }
    }

    fn next_genome(&mut self, schema: &ParamSchema, history: &[TrialRecord], survivors: impl Fn(&[TrialRecord], &ParamSchema, usize) -> Vec<Vec<f64>>) -> Vec<f64> {
        if self.genomes.len() < self.population_size {
            let g = random_genome(schema, &mut self.rng);
            self.genomes.push(g.clone());
            return g;
        }

        if self.queue.is_empty() {
            let parents = survivors(history, schema, self.population_size);
            if parents.is_empty() {
                let g = random_genome(schema, &mut self.rng);
                self.genomes.push(g.clone());
                return g;
            }
            let mut offspring = Vec::with_capacity(self.population_size);
            for _ in 0..self.population_size {
                let a = &parents[self.rng.gen_range(0..parents.len())];
                let b = &parents[self.rng.gen_range(0..parents.len())];
                let mut child = crossover(a, b, &mut self.rng, self.crossover_prob);
                mutate(&mut child, schema, &mut self.rng, self.mutation_prob);
                offspring.push(child);
            }
            self.queue = offspring;
        }
        self.queue.pop().unwrap_or_else(|| random_genome(schema, &mut self.rng))
    }
}

fn select_by_crowding(history: &[TrialRecord], schema: &ParamSchema, count: usize) -> Vec<Vec<f64>> {
    let objectives: Vec<Objective> = Vec::new();
    select_survivors(history, schema, count, &objectives, false)
}

fn select_by_reference_points(history: &[TrialRecord], schema: &ParamSchema, count: usize) -> Vec<Vec<f64>> {
    let objectives: Vec<Objective> = Vec::new();
    select_survivors(history, schema, count, &objectives, true)
}

fn select_survivors(
    history: &[TrialRecord],
    schema: &ParamSchema,
    count: usize,
    objectives_hint: &[Objective],
    _use_reference_points: bool,
) -> Vec<Vec<f64>> {
    if history.is_empty() {
        return Vec::new();
    }
    let objectives = if objectives_hint.is_empty() {
        infer_objectives(history)
    } else {
        objectives_hint.to_vec()
    };
    let ranks = non_dominated_sort(history, &objectives);
    let mut by_rank: std::collections::BTreeMap<usize, Vec<usize>> = std::collections::BTreeMap::new();
    for (i, r) in ranks.iter().enumerate() {
        by_rank.entry(*r).or_default().push(i);
    }

    let mut selected = Vec::new();
    for (_, members) in by_rank {
        if selected.len() >= count {
            break;
        }
        if selected.len() + members.len() <= count {
            selected.extend(members);
        } else {
            let distances = crowding_distance(&members, history, &objectives);
            let mut ordered: Vec<(usize, f64)> = members.into_iter().zip(distances).collect();
            ordered.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
            let remaining = count - selected.len();
            selected.extend(ordered.into_iter().take(remaining).map(|(i, _)| i));
            break;
        }
    }

    selected.into_iter().map(|i| genome_from_payload(schema, &history[i].params)).collect()
}

fn infer_objectives(history: &[TrialRecord]) -> Vec<Objective> {
    let n = history.first().map(|t| t.objective_values.len()).unwrap_or(1);
    (0..n).map(|i| Objective { metric: format!("objective_{i}"), direction: crate::types::Direction::Maximize }).collect()
}

/// NSGA-II: Pareto ranking + crowding-distance niching. Suited to two or
/// three objectives.
pub struct Nsga2Sampler {
    population: Population,
}

impl Nsga2Sampler {
    pub fn new(seed: u64, population_size: usize, crossover_prob: f64, mutation_prob: f64) -> Self {
        Self { population: Population::new(seed, population_size, crossover_prob, mutation_prob) }
    }
}

impl Sampler for Nsga2Sampler {
    fn suggest(&mut self, schema: &ParamSchema, history: &[TrialRecord], _trial_number: usize) -> ParamPayload {
        let genome = self.population.next_genome(schema, history, select_by_crowding);
        payload_from_genome(schema, &genome)
    }
}

/// NSGA-III: Pareto ranking + reference-point niching, better suited than
/// crowding distance to four or more simultaneous objectives. This
/// implementation reuses NSGA-II's crowding distance as the within-front
/// tiebreaker, which degrades gracefully for low objective counts and is a
/// documented simplification for higher counts (see DESIGN.md).
pub struct Nsga3Sampler {
    population: Population,
}

impl Nsga3Sampler {
    pub fn new(seed: u64, population_size: usize, crossover_prob: f64, mutation_prob: f64) -> Self {
        Self { population: Population::new(seed, population_size, crossover_prob, mutation_prob) }
    }
}

impl Sampler for Nsga3Sampler {
    fn suggest(&mut self, schema: &ParamSchema, history: &[TrialRecord], _trial_number: usize) -> ParamPayload {
        let genome = self.population.next_genome(schema, history, select_by_reference_points);
        payload_from_genome(schema, &genome)
    }
}
