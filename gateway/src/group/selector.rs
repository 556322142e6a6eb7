/// 选出下一个要播放的成员
///
/// 先按轮询顺序前进一位；启用移动优先时，从该位置起最多扫描一整圈，
/// 遇到正在报告移动的成员就直接跳到它。
pub fn select_next<F>(current: Option<usize>, len: usize, motion_priority: bool, has_motion: F) -> Option<usize>
where
    F: Fn(usize) -> bool,
{
    if len == 0 {
        return None;
    }
    let next = match current {
        Some(index) => (index + 1) % len,
        None => 0,
    };
    if motion_priority {
        if let Some(index) = (0..len).map(|offset| (next + offset) % len).find(|i| has_motion(*i)) {
            return Some(index);
        }
    }
    Some(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_round_robin() {
        let none = |_| false;
        assert_eq!(select_next(None, 3, true, none), Some(0));
        assert_eq!(select_next(Some(0), 3, true, none), Some(1));
        assert_eq!(select_next(Some(2), 3, false, none), Some(0));
        assert_eq!(select_next(Some(5), 3, false, none), Some(0));
        assert_eq!(select_next(Some(0), 0, true, none), None);
    }

    #[test]
    fn test_motion_jumps_ahead() {
        let motion = [false, false, false, true];
        assert_eq!(select_next(Some(0), 4, true, |i| motion[i]), Some(3));
        assert_eq!(select_next(Some(0), 4, false, |i| motion[i]), Some(1));
        // 正在报告移动的成员会一直被选中
        assert_eq!(select_next(Some(3), 4, true, |i| motion[i]), Some(3));
    }

    proptest! {
        #[test]
        fn prop_motion_member_always_selected(
            motion in proptest::collection::vec(any::<bool>(), 1..8),
            current in 0usize..8,
        ) {
            let len = motion.len();
            let current = current % len;
            let selected = select_next(Some(current), len, true, |i| motion[i]).unwrap();

            if motion.iter().any(|m| *m) {
                prop_assert!(motion[selected]);
            } else {
                prop_assert_eq!(selected, (current + 1) % len);
            }
        }
    }
}
