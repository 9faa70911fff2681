//! Property-based tests for sparse memory and edit sessions.
//!
//! Uses proptest to verify invariants across randomly generated edits.

use hex_core::{
    Address, AddressRange, Contiguity, EditSession, EngineConfig, EngineResult, Matcher, Pattern,
    Selection, SparseMemory, DEFAULT_ADDRESS_LIMIT,
};
use proptest::prelude::*;

/// Addresses used by the generators stay below this
const SPAN: Address = 128;

#[derive(Debug, Clone)]
enum Edit {
    Overwrite(Address, Vec<u8>),
    Insert(Address, Vec<u8>),
    Delete(Address, Address),
    Reserve(Address, Address),
    Clear(Address, Address),
    Fill(Address, Address, u8),
    FillGaps(Address, Address, u8),
    Move(Address, Address, Address),
    Flood(Address, u8),
    Shift(i64),
    Crop(Vec<(Address, Address)>),
    DeleteSelected(Vec<(Address, Address)>),
    FillSelected(Vec<(Address, Address)>, u8),
    ShiftSelected(Vec<(Address, Address)>, i64),
    Paste(Vec<(Address, Address)>, SparseMemory, bool),
    ReplaceAll(Vec<Matcher>, Vec<u8>),
}

fn bytes() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 1..12)
}

/// `(start, size)` pairs, possibly overlapping
fn ranges() -> impl Strategy<Value = Vec<(Address, Address)>> {
    prop::collection::vec((0..SPAN, 1..16u64), 0..4)
}

fn matcher() -> impl Strategy<Value = Matcher> {
    prop_oneof![
        any::<u8>().prop_map(Matcher::Byte),
        Just(Matcher::Any),
        Just(Matcher::Unset),
    ]
}

fn edit() -> impl Strategy<Value = Edit> {
    prop_oneof![
        (0..SPAN, bytes()).prop_map(|(a, d)| Edit::Overwrite(a, d)),
        (0..SPAN, bytes()).prop_map(|(a, d)| Edit::Insert(a, d)),
        (0..SPAN, 1..16u64).prop_map(|(a, n)| Edit::Delete(a, n)),
        (0..SPAN, 1..16u64).prop_map(|(a, n)| Edit::Reserve(a, n)),
        (0..SPAN, 1..16u64).prop_map(|(a, n)| Edit::Clear(a, a + n)),
        (0..SPAN, 1..16u64, any::<u8>()).prop_map(|(a, n, v)| Edit::Fill(a, a + n, v)),
        (0..SPAN, 1..16u64, any::<u8>()).prop_map(|(a, n, v)| Edit::FillGaps(a, a + n, v)),
        (0..SPAN, 1..16u64, 0..SPAN).prop_map(|(f, n, t)| Edit::Move(f, n, t)),
        (0..SPAN, any::<u8>()).prop_map(|(a, v)| Edit::Flood(a, v)),
        (-16i64..16).prop_map(Edit::Shift),
        ranges().prop_map(Edit::Crop),
        ranges().prop_map(Edit::DeleteSelected),
        (ranges(), any::<u8>()).prop_map(|(r, v)| Edit::FillSelected(r, v)),
        (ranges(), -16i64..16).prop_map(|(r, o)| Edit::ShiftSelected(r, o)),
        (ranges(), memory(), any::<bool>()).prop_map(|(r, m, c)| Edit::Paste(r, m, c)),
        (prop::collection::vec(matcher(), 1..4), bytes())
            .prop_map(|(p, d)| Edit::ReplaceAll(p, d)),
    ]
}

fn memory() -> impl Strategy<Value = SparseMemory> {
    prop::collection::vec((0..SPAN, bytes()), 0..6).prop_map(|ranges| {
        SparseMemory::from_blocks(DEFAULT_ADDRESS_LIMIT, ranges)
            .expect("generated ranges fit the default limit")
    })
}

fn selection_of(ranges: &[(Address, Address)]) -> Selection {
    Selection::from_ranges(
        ranges
            .iter()
            .map(|(start, size)| AddressRange::sized(*start, *size)),
    )
}

/// Sets up the selection a selection-scoped edit works on
fn prepare(session: &mut EditSession, edit: &Edit) {
    match edit {
        Edit::DeleteSelected(ranges)
        | Edit::FillSelected(ranges, _)
        | Edit::ShiftSelected(ranges, _)
        | Edit::Paste(ranges, _, _) => {
            session.clear_selection();
            for range in selection_of(ranges).ranges() {
                session.add_selection(*range);
            }
        }
        Edit::ReplaceAll(..) => session.clear_selection(),
        _ => {}
    }
}

fn apply(session: &mut EditSession, edit: &Edit) -> EngineResult<()> {
    match edit {
        Edit::Overwrite(a, d) => session.overwrite(*a, d),
        Edit::Insert(a, d) => session.insert(*a, d),
        Edit::Delete(a, n) => session.delete(*a, *n),
        Edit::Reserve(a, n) => session.reserve(*a, *n),
        Edit::Clear(s, e) => session.clear(*s, *e),
        Edit::Fill(s, e, v) => session.fill(*s, *e, *v),
        Edit::FillGaps(s, e, v) => session.fill_gaps(*s, *e, *v),
        Edit::Move(f, n, t) => session.move_range(*f, *n, *t),
        Edit::Flood(a, v) => session.flood(*a, *v, Contiguity::Both).map(|_| ()),
        Edit::Shift(o) => session.shift(*o),
        Edit::Crop(ranges) => session.crop(selection_of(ranges).ranges()),
        Edit::DeleteSelected(_) => session.delete_selected(),
        Edit::FillSelected(_, v) => session.fill_selected(*v),
        Edit::ShiftSelected(_, o) => session.shift_selected(*o),
        Edit::Paste(_, chunk, clear) => session.paste(chunk, *clear),
        Edit::ReplaceAll(matchers, replacement) => {
            let pattern = Pattern::new(matchers.clone())?;
            session.replace_all(&pattern, replacement).map(|_| ())
        }
    }
}

fn run(session: &mut EditSession, edit: &Edit) -> EngineResult<()> {
    prepare(session, edit);
    apply(session, edit)
}

fn loaded(memory: SparseMemory) -> EditSession {
    EditSession::with_memory(EngineConfig::default(), memory)
        .expect("memory fits the default limit")
}

proptest! {
    /// Reads return the last value written to each address, unset elsewhere.
    #[test]
    fn prop_last_write_wins(
        writes in prop::collection::vec((0..SPAN, bytes()), 1..20),
    ) {
        let mut memory = SparseMemory::new();
        let mut model = vec![None; (SPAN * 2) as usize];

        for (address, data) in &writes {
            memory.write(*address, data).unwrap();
            for (offset, byte) in data.iter().enumerate() {
                model[*address as usize + offset] = Some(*byte);
            }
        }

        prop_assert_eq!(memory.read_values(0, SPAN * 2), model);
    }

    /// Block invariants hold after every edit, failed or not.
    #[test]
    fn prop_invariants_after_random_edits(
        initial in memory(),
        edits in prop::collection::vec(edit(), 1..30),
    ) {
        let mut session = loaded(initial);
        for edit in &edits {
            let _ = run(&mut session, edit);
            prop_assert!(session.memory().check_invariants(), "after {:?}", edit);
        }
    }

    /// A failed edit leaves the memory and the history untouched.
    #[test]
    fn prop_failed_edit_is_atomic(
        initial in memory(),
        edits in prop::collection::vec(edit(), 1..20),
    ) {
        let mut session = loaded(initial);
        for edit in &edits {
            prepare(&mut session, edit);
            let before = session.snapshot();
            if apply(&mut session, edit).is_err() {
                prop_assert_eq!(session.snapshot(), before);
            }
        }
    }

    /// Inserting then deleting the same range restores the memory.
    #[test]
    fn prop_insert_delete_left_inverse(
        initial in memory(),
        address in 0..SPAN,
        data in bytes(),
    ) {
        let mut memory = initial.clone();
        memory.insert(address, &data).unwrap();
        memory.delete(address, data.len() as Address).unwrap();
        prop_assert_eq!(memory, initial);
    }

    /// Undo restores the exact prior state and redo replays the edit.
    #[test]
    fn prop_undo_redo_exact(
        initial in memory(),
        edit in edit(),
    ) {
        let mut session = loaded(initial.clone());
        // Edits that change nothing, such as a replace without matches, record nothing
        if run(&mut session, &edit).is_ok() && session.can_undo() {
            let after = session.memory().clone();

            session.undo().unwrap();
            prop_assert_eq!(session.memory(), &initial);

            session.redo().unwrap();
            prop_assert_eq!(session.memory(), &after);
        }
    }

    /// Undoing a whole edit sequence returns to the loaded document.
    #[test]
    fn prop_undo_all_restores_document(
        initial in memory(),
        edits in prop::collection::vec(edit(), 1..20),
    ) {
        let mut session = loaded(initial.clone());
        for edit in &edits {
            let _ = run(&mut session, edit);
        }
        while session.can_undo() {
            session.undo().unwrap();
        }
        prop_assert_eq!(session.memory(), &initial);
        prop_assert!(!session.is_dirty());
    }

    /// Cropping keeps retained bytes at their addresses.
    #[test]
    fn prop_crop_keeps_addresses(
        initial in memory(),
        keep in prop::collection::vec((0..SPAN, 1..16u64), 0..5),
    ) {
        let selection = selection_of(&keep);
        let mut memory = initial.clone();
        memory.crop(selection.ranges()).unwrap();

        for address in 0..SPAN * 2 {
            let expected = if selection.contains(address) {
                initial.peek(address)
            } else {
                None
            };
            prop_assert_eq!(memory.peek(address), expected, "address {}", address);
        }
    }

    /// Moving a range into empty space and back restores the memory.
    #[test]
    fn prop_move_round_trip(
        initial in memory(),
        from in 0..SPAN,
        size in 1..16u64,
        to in 0..SPAN * 2,
    ) {
        prop_assume!(from + size <= to || to + size <= from);
        prop_assume!(initial.extract(to, to + size).is_empty());

        let mut memory = initial.clone();
        memory.move_range(from, size, to).unwrap();
        memory.move_range(to, size, from).unwrap();
        prop_assert_eq!(memory, initial);
    }

    /// Selections stay attached to the same bytes across insertions.
    #[test]
    fn prop_selection_follows_insert(
        start in 0..SPAN,
        size in 1..16u64,
        pivot in 0..SPAN,
        data in bytes(),
    ) {
        let mut session = EditSession::new(EngineConfig::default()).unwrap();
        session.overwrite(0, &[0xAB; (SPAN * 2) as usize]).unwrap();
        session.select_range(start, start + size);
        session.insert(pivot, &data).unwrap();

        let selected: Address = session.selection().total_size();
        prop_assert_eq!(selected, size);
        prop_assert!(session
            .selection()
            .ranges()
            .iter()
            .all(|r| r.endex <= pivot || r.start >= pivot + data.len() as Address));
    }
}
