// Property computation by full traversal.
//
// Used only when a caller asks for bits that are not already known. Cyclicity
// and co-accessibility come from a Tarjan SCC pass over an explicit DFS stack.

use hashbrown::HashSet;

use wfst_core::{EPSILON, FstProperties, Semiring, StateId};

use crate::fst::{ArcList, Fst};

type P = FstProperties;

const UNVISITED: u32 = u32::MAX;

/// Determines every trinary property bit of `fst` (plus `ERROR` if set).
pub fn compute_properties<W: Semiring, F: Fst<W> + ?Sized>(fst: &F) -> FstProperties {
    let error = fst.stored_properties() & P::ERROR;
    let states: Vec<StateId> = fst.states().collect();
    let nstates = states.iter().map(|&s| s as usize + 1).max().unwrap_or(0);
    if nstates == 0 {
        return P::NULL | error;
    }

    let arcs: Vec<ArcList<W>> = (0..nstates as StateId).map(|s| fst.arcs(s)).collect();
    let finals: Vec<bool> = (0..nstates as StateId).map(|s| fst.is_final(s)).collect();

    let mut props = error | local_properties(fst, &arcs);

    let scc = Scc::compute(&arcs, fst.start(), &finals);
    props |= scc.properties();
    props |= string_property(fst.start(), &arcs, &finals, nstates);

    if scc.cyclic {
        let mut weighted_cycles = false;
        for (s, list) in arcs.iter().enumerate() {
            for arc in list.iter() {
                let same = scc.component[arc.nextstate as usize] == scc.component[s];
                if same && !arc.weight.is_one() {
                    weighted_cycles = true;
                }
            }
        }
        props |= if weighted_cycles {
            P::WEIGHTED_CYCLES
        } else {
            P::UNWEIGHTED_CYCLES
        };
    } else {
        props |= P::UNWEIGHTED_CYCLES;
    }
    props
}

// Bits decidable by looking at one state at a time.
fn local_properties<W: Semiring, F: Fst<W> + ?Sized>(fst: &F, arcs: &[ArcList<W>]) -> FstProperties {
    let mut acceptor = true;
    let mut epsilons = false;
    let mut iepsilons = false;
    let mut oepsilons = false;
    let mut isorted = true;
    let mut osorted = true;
    let mut ideterministic = true;
    let mut odeterministic = true;
    let mut weighted = false;
    let mut topsorted = true;

    let mut ilabels = HashSet::new();
    let mut olabels = HashSet::new();
    for (s, list) in arcs.iter().enumerate() {
        ilabels.clear();
        olabels.clear();
        let mut prev: Option<(u32, u32)> = None;
        for arc in list.iter() {
            acceptor &= arc.ilabel == arc.olabel;
            iepsilons |= arc.ilabel == EPSILON;
            oepsilons |= arc.olabel == EPSILON;
            epsilons |= arc.is_epsilon();
            if let Some((pi, po)) = prev {
                isorted &= pi <= arc.ilabel;
                osorted &= po <= arc.olabel;
            }
            prev = Some((arc.ilabel, arc.olabel));
            ideterministic &= ilabels.insert(arc.ilabel);
            odeterministic &= olabels.insert(arc.olabel);
            weighted |= !arc.weight.is_zero() && !arc.weight.is_one();
            topsorted &= arc.nextstate as usize > s;
        }
        let w = fst.final_weight(s as StateId);
        weighted |= !w.is_zero() && !w.is_one();
    }

    let pick = |cond: bool, yes: P, no: P| if cond { yes } else { no };
    pick(acceptor, P::ACCEPTOR, P::NOT_ACCEPTOR)
        | pick(epsilons, P::EPSILONS, P::NO_EPSILONS)
        | pick(iepsilons, P::I_EPSILONS, P::NO_I_EPSILONS)
        | pick(oepsilons, P::O_EPSILONS, P::NO_O_EPSILONS)
        | pick(isorted, P::I_LABEL_SORTED, P::NOT_I_LABEL_SORTED)
        | pick(osorted, P::O_LABEL_SORTED, P::NOT_O_LABEL_SORTED)
        | pick(ideterministic, P::I_DETERMINISTIC, P::NON_I_DETERMINISTIC)
        | pick(odeterministic, P::O_DETERMINISTIC, P::NON_O_DETERMINISTIC)
        | pick(weighted, P::WEIGHTED, P::UNWEIGHTED)
        | pick(topsorted, P::TOP_SORTED, P::NOT_TOP_SORTED)
}

// A string automaton is a single path from the start to its only final
// state, covering every state.
fn string_property<W: Semiring>(
    start: Option<StateId>,
    arcs: &[ArcList<W>],
    finals: &[bool],
    nstates: usize,
) -> FstProperties {
    let Some(mut s) = start else {
        return P::STRING;
    };
    let mut visited = vec![false; nstates];
    let mut length = 0;
    loop {
        let index = s as usize;
        if visited[index] {
            return P::NOT_STRING;
        }
        visited[index] = true;
        length += 1;
        match (arcs[index].len(), finals[index]) {
            (0, true) => break,
            (1, false) => s = arcs[index][0].nextstate,
            _ => return P::NOT_STRING,
        }
    }
    if length == nstates {
        P::STRING
    } else {
        P::NOT_STRING
    }
}

struct Scc {
    /// Component index of each state, in order of completion.
    component: Vec<u32>,
    accessible: bool,
    coaccessible: bool,
    cyclic: bool,
    initial_cyclic: bool,
}

impl Scc {
    fn compute<W: Semiring>(arcs: &[ArcList<W>], start: Option<StateId>, finals: &[bool]) -> Self {
        let n = arcs.len();
        let mut index = vec![UNVISITED; n];
        let mut lowlink = vec![0u32; n];
        let mut on_stack = vec![false; n];
        let mut component = vec![UNVISITED; n];
        let mut tarjan_stack: Vec<u32> = Vec::new();
        // (state, next arc position)
        let mut dfs: Vec<(u32, usize)> = Vec::new();
        let mut next_index = 0u32;
        let mut ncomponents = 0u32;
        let mut component_cyclic: Vec<bool> = Vec::new();

        let roots = start.into_iter().chain(0..n as StateId);
        let mut accessible = true;
        for (i, root) in roots.enumerate() {
            if index[root as usize] != UNVISITED {
                continue;
            }
            if i > 0 && start.is_some() {
                accessible = false;
            }
            dfs.push((root, 0));
            index[root as usize] = next_index;
            lowlink[root as usize] = next_index;
            next_index += 1;
            tarjan_stack.push(root);
            on_stack[root as usize] = true;

            while let Some(top) = dfs.last_mut() {
                let (s, pos) = *top;
                top.1 += 1;
                let su = s as usize;
                if let Some(arc) = arcs[su].get(pos) {
                    let t = arc.nextstate as usize;
                    if index[t] == UNVISITED {
                        index[t] = next_index;
                        lowlink[t] = next_index;
                        next_index += 1;
                        tarjan_stack.push(t as u32);
                        on_stack[t] = true;
                        dfs.push((t as u32, 0));
                    } else if on_stack[t] {
                        lowlink[su] = lowlink[su].min(index[t]);
                    }
                    continue;
                }
                dfs.pop();
                if let Some(&(parent, _)) = dfs.last() {
                    let pu = parent as usize;
                    lowlink[pu] = lowlink[pu].min(lowlink[su]);
                }
                if lowlink[su] == index[su] {
                    let mut size = 0;
                    while let Some(t) = tarjan_stack.pop() {
                        on_stack[t as usize] = false;
                        component[t as usize] = ncomponents;
                        size += 1;
                        if t == s {
                            break;
                        }
                    }
                    let self_loop = arcs[su].iter().any(|a| a.nextstate == s);
                    component_cyclic.push(size > 1 || self_loop);
                    ncomponents += 1;
                }
            }
        }
        if start.is_none() && n > 0 {
            accessible = false;
        }

        // Successor components complete before their predecessors, so one
        // pass in completion order settles co-accessibility.
        let mut members: Vec<Vec<usize>> = vec![Vec::new(); ncomponents as usize];
        for (s, &c) in component.iter().enumerate() {
            members[c as usize].push(s);
        }
        let mut coaccess = vec![false; ncomponents as usize];
        for c in 0..ncomponents as usize {
            coaccess[c] = members[c].iter().any(|&s| {
                finals[s]
                    || arcs[s].iter().any(|a| {
                        let tc = component[a.nextstate as usize] as usize;
                        tc != c && coaccess[tc]
                    })
            });
        }

        let cyclic = component_cyclic.iter().any(|&c| c);
        let initial_cyclic =
            start.is_some_and(|s| component_cyclic[component[s as usize] as usize]);
        Self {
            component,
            accessible,
            coaccessible: coaccess.iter().all(|&c| c),
            cyclic,
            initial_cyclic,
        }
    }

    fn properties(&self) -> FstProperties {
        let mut props = P::empty();
        props |= if self.accessible { P::ACCESSIBLE } else { P::NOT_ACCESSIBLE };
        props |= if self.coaccessible { P::COACCESSIBLE } else { P::NOT_COACCESSIBLE };
        props |= if self.cyclic { P::CYCLIC } else { P::ACYCLIC };
        props |= if self.initial_cyclic {
            P::INITIAL_CYCLIC
        } else {
            P::INITIAL_ACYCLIC
        };
        props
    }
}

/// Checks that the stored bits of `fst` agree with a fresh traversal.
pub fn properties_consistent<W: Semiring, F: Fst<W> + ?Sized>(fst: &F) -> bool {
    let stored = fst.stored_properties();
    let computed = compute_properties(fst);
    wfst_core::properties::compat_properties(stored, computed)
}
