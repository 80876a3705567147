// Trimming: keep only states on some successful path.

use wfst_core::{FstProperties, Semiring, StateId};

use crate::fst::MutableFst;

/// Removes every state that is not both reachable from the start and able
/// to reach a final state. Survivors keep their relative order.
pub fn connect<W, F>(fst: &mut F)
where
    W: Semiring,
    F: MutableFst<W> + ?Sized,
{
    let n = fst.num_states();
    let mut access = vec![false; n];
    let mut preds: Vec<Vec<StateId>> = vec![Vec::new(); n];

    if let Some(start) = fst.start() {
        let mut stack = vec![start];
        access[start as usize] = true;
        while let Some(s) = stack.pop() {
            for arc in fst.arcs(s).iter() {
                let next = arc.nextstate as usize;
                preds[next].push(s);
                if !access[next] {
                    access[next] = true;
                    stack.push(arc.nextstate);
                }
            }
        }
    }

    let mut coaccess = vec![false; n];
    let mut stack: Vec<StateId> = (0..n as StateId)
        .filter(|&s| access[s as usize] && fst.is_final(s))
        .collect();
    for &s in &stack {
        coaccess[s as usize] = true;
    }
    while let Some(s) = stack.pop() {
        for &p in &preds[s as usize] {
            if !coaccess[p as usize] {
                coaccess[p as usize] = true;
                stack.push(p);
            }
        }
    }

    let dead: Vec<StateId> = (0..n as StateId)
        .filter(|&s| !(access[s as usize] && coaccess[s as usize]))
        .collect();
    if dead.len() == n {
        fst.delete_states();
    } else {
        fst.delete_state_set(&dead);
    }
    fst.set_properties(
        FstProperties::ACCESSIBLE | FstProperties::COACCESSIBLE,
        FstProperties::ACCESSIBLE
            | FstProperties::NOT_ACCESSIBLE
            | FstProperties::COACCESSIBLE
            | FstProperties::NOT_COACCESSIBLE,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fst::{ExpandedFst, Fst};
    use crate::vector::VectorFst;
    use wfst_core::{Arc, TropicalWeight};

    type W = TropicalWeight;

    #[test]
    fn drops_unreachable_and_dead_states() {
        let mut fst = VectorFst::<W>::new();
        fst.add_states(5);
        fst.set_start(1).unwrap();
        fst.add_arc(0, Arc::new(1, 1, W::one(), 1)).unwrap(); // 0 unreachable
        fst.add_arc(1, Arc::new(2, 2, W::one(), 2)).unwrap();
        fst.add_arc(1, Arc::new(3, 3, W::one(), 3)).unwrap(); // 3 is a dead end
        fst.add_arc(2, Arc::new(4, 4, W::one(), 4)).unwrap();
        fst.set_final(4, W::one()).unwrap();

        connect(&mut fst);
        assert_eq!(fst.num_states(), 3);
        assert_eq!(fst.start(), Some(0));
        assert_eq!(*fst.arcs(0), vec![Arc::new(2, 2, W::one(), 1)]);
        assert_eq!(*fst.arcs(1), vec![Arc::new(4, 4, W::one(), 2)]);
        assert!(fst.is_final(2));
        let props = fst.properties(FstProperties::ACCESSIBLE | FstProperties::COACCESSIBLE, false);
        assert_eq!(props, FstProperties::ACCESSIBLE | FstProperties::COACCESSIBLE);
    }

    #[test]
    fn no_final_state_empties_the_fst() {
        let mut fst = VectorFst::<W>::new();
        fst.add_states(2);
        fst.set_start(0).unwrap();
        fst.add_arc(0, Arc::new(1, 1, W::one(), 1)).unwrap();
        connect(&mut fst);
        assert_eq!(fst.num_states(), 0);
        assert_eq!(fst.start(), None);
    }
}
