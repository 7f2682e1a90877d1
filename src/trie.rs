use ipnet::Ipv4Net;
use std::net::Ipv4Addr;

/*
    Path-compressed binary radix tree over the 32-bit IPv4 key space.

    Every node is identified by (key, bits): the top `bits` bits of `key` are
    significant and the remaining ones are always zero. A child stored in
    slot `b` of a node at depth `bits` shares the node's first `bits` bits and
    has bit number `bits` (counting from the most significant bit) equal to
    `b`. Nodes without an entry only exist to join two subtrees, so they
    always have both children.
*/
#[derive(Debug)]
struct Node<T> {
    key: u32,
    bits: u8,
    entry: Option<(Ipv4Net, T)>,
    children: [Option<Box<Node<T>>>; 2],
}

impl<T> Node<T> {
    fn leaf(prefix: Ipv4Net, value: T) -> Node<T> {
        Node {
            key: u32::from(prefix.network()),
            bits: prefix.prefix_len(),
            entry: Some((prefix, value)),
            children: [None, None],
        }
    }

    fn glue(key: u32, bits: u8) -> Node<T> {
        Node {
            key: key & mask(bits),
            bits,
            entry: None,
            children: [None, None],
        }
    }

    // True when the node's prefix covers (key, bits).
    fn covers(&self, key: u32, bits: u8) -> bool {
        self.bits <= bits && key & mask(self.bits) == self.key
    }
}

fn mask(bits: u8) -> u32 {
    match bits {
        0 => 0,
        _ => u32::MAX << (32 - u32::from(bits)),
    }
}

// Bit `pos` of `key`, with bit 0 being the most significant one.
fn bit_at(key: u32, pos: u8) -> usize {
    ((key >> (31 - u32::from(pos))) & 1) as usize
}

fn common_len(a: u32, a_bits: u8, b: u32, b_bits: u8) -> u8 {
    let diff = (a ^ b).leading_zeros().min(32) as u8;
    diff.min(a_bits).min(b_bits)
}

fn split(prefix: &Ipv4Net) -> (Ipv4Net, u32, u8) {
    let prefix = prefix.trunc();
    (prefix, u32::from(prefix.network()), prefix.prefix_len())
}

/// Longest-prefix-match table keyed by IPv4 network.
///
/// Host bits of the keys passed in are ignored, so `10.1.2.3/8` and
/// `10.0.0.0/8` address the same entry. More and less specific prefixes are
/// independent entries; removing one never touches the other.
#[derive(Debug)]
pub struct PrefixTrie<T> {
    root: Option<Box<Node<T>>>,
    len: usize,
}

impl<T> Default for PrefixTrie<T> {
    fn default() -> Self {
        PrefixTrie::new()
    }
}

impl<T> PrefixTrie<T> {
    pub fn new() -> PrefixTrie<T> {
        PrefixTrie { root: None, len: 0 }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Stores `value` at exactly `prefix`, returning the value it replaced.
    pub fn insert(&mut self, prefix: Ipv4Net, value: T) -> Option<T> {
        let (prefix, key, bits) = split(&prefix);
        let prev = insert_at(&mut self.root, prefix, key, bits, value);
        if prev.is_none() {
            self.len += 1;
        }
        prev
    }

    /// Removes the value stored at exactly `prefix`.
    pub fn remove(&mut self, prefix: &Ipv4Net) -> Option<T> {
        let (_, key, bits) = split(prefix);
        let removed = remove_at(&mut self.root, key, bits);
        if removed.is_some() {
            self.len -= 1;
        }
        removed
    }

    pub fn get(&self, prefix: &Ipv4Net) -> Option<&T> {
        let (_, key, bits) = split(prefix);
        let mut cur = self.root.as_deref();
        while let Some(node) = cur {
            if !node.covers(key, bits) {
                return None;
            }
            if node.bits == bits {
                return node.entry.as_ref().map(|(_, v)| v);
            }
            cur = node.children[bit_at(key, node.bits)].as_deref();
        }
        None
    }

    pub fn contains(&self, prefix: &Ipv4Net) -> bool {
        self.get(prefix).is_some()
    }

    /// Most specific stored prefix containing `addr`.
    pub fn longest_match(&self, addr: Ipv4Addr) -> Option<(Ipv4Net, &T)> {
        let key = u32::from(addr);
        let mut best = None;
        let mut cur = self.root.as_deref();
        while let Some(node) = cur {
            if !node.covers(key, 32) {
                break;
            }
            if let Some((prefix, value)) = &node.entry {
                best = Some((*prefix, value));
            }
            if node.bits == 32 {
                break;
            }
            cur = node.children[bit_at(key, node.bits)].as_deref();
        }
        best
    }

    /// Entries ordered by network address, less specific first.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            stack: self.root.as_deref().into_iter().collect(),
        }
    }
}

fn insert_at<T>(
    slot: &mut Option<Box<Node<T>>>,
    prefix: Ipv4Net,
    key: u32,
    bits: u8,
    value: T,
) -> Option<T> {
    let Some(mut node) = slot.take() else {
        *slot = Some(Box::new(Node::leaf(prefix, value)));
        return None;
    };

    let common = common_len(node.key, node.bits, key, bits);
    if common == node.bits && common == bits {
        let prev = node.entry.replace((prefix, value)).map(|(_, v)| v);
        *slot = Some(node);
        return prev;
    }

    if common == node.bits {
        let prev = insert_at(
            &mut node.children[bit_at(key, node.bits)],
            prefix,
            key,
            bits,
            value,
        );
        *slot = Some(node);
        return prev;
    }

    // The existing node diverges from the new prefix above its own depth, so
    // a new node takes its place: either the new prefix itself when it covers
    // the old node, or a glue node at the point where the two diverge.
    if common == bits {
        let slot_bit = bit_at(node.key, bits);
        let mut parent = Node::leaf(prefix, value);
        parent.children[slot_bit] = Some(node);
        *slot = Some(Box::new(parent));
    } else {
        let slot_bit = bit_at(node.key, common);
        let mut parent = Node::glue(key, common);
        parent.children[slot_bit] = Some(node);
        parent.children[bit_at(key, common)] = Some(Box::new(Node::leaf(prefix, value)));
        *slot = Some(Box::new(parent));
    }
    None
}

fn remove_at<T>(slot: &mut Option<Box<Node<T>>>, key: u32, bits: u8) -> Option<T> {
    let node = slot.as_mut()?;
    if !node.covers(key, bits) {
        return None;
    }
    let removed = if node.bits == bits {
        node.entry.take().map(|(_, v)| v)
    } else {
        remove_at(&mut node.children[bit_at(key, node.bits)], key, bits)
    };
    if removed.is_some() {
        compact(slot);
    }
    removed
}

// Drops or splices out a node that no longer carries an entry and has fewer
// than two children.
fn compact<T>(slot: &mut Option<Box<Node<T>>>) {
    let collapse = match slot {
        Some(node) if node.entry.is_none() => {
            node.children.iter().filter(|c| c.is_some()).count() < 2
        }
        _ => false,
    };
    if collapse {
        if let Some(mut node) = slot.take() {
            *slot = node.children[0]
                .take()
                .or_else(|| node.children[1].take());
        }
    }
}

pub struct Iter<'a, T> {
    stack: Vec<&'a Node<T>>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = (Ipv4Net, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(node) = self.stack.pop() {
            self.stack.extend(node.children.iter().rev().flatten().map(|c| &**c));
            if let Some((prefix, value)) = &node.entry {
                return Some((*prefix, value));
            }
        }
        None
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn net(s: &str) -> Ipv4Net {
        s.parse().unwrap()
    }

    fn addr(s: &str) -> Ipv4Addr {
        s.parse().unwrap()
    }

    #[test]
    fn longest_match_picks_most_specific() {
        let mut trie = PrefixTrie::new();
        trie.insert(net("10.0.0.0/8"), "eight");
        trie.insert(net("10.1.0.0/16"), "sixteen");

        let (prefix, value) = trie.longest_match(addr("10.1.2.3")).unwrap();
        assert_eq!(prefix, net("10.1.0.0/16"));
        assert_eq!(*value, "sixteen");

        let (prefix, value) = trie.longest_match(addr("10.2.0.0")).unwrap();
        assert_eq!(prefix, net("10.0.0.0/8"));
        assert_eq!(*value, "eight");

        assert!(trie.longest_match(addr("192.168.0.1")).is_none());
    }

    #[test]
    fn insert_overwrites_exact_position() {
        let mut trie = PrefixTrie::new();
        assert_eq!(trie.insert(net("192.0.2.0/24"), 1), None);
        assert_eq!(trie.insert(net("192.0.2.0/24"), 2), Some(1));
        assert_eq!(trie.len(), 1);
        assert_eq!(trie.get(&net("192.0.2.0/24")), Some(&2));
    }

    #[test]
    fn host_bits_are_ignored() {
        let mut trie = PrefixTrie::new();
        trie.insert(net("10.1.2.3/8"), ());
        assert!(trie.contains(&net("10.0.0.0/8")));
        assert_eq!(trie.iter().next().unwrap().0, net("10.0.0.0/8"));
    }

    #[test]
    fn remove_leaves_covering_and_sibling_prefixes() {
        let mut trie = PrefixTrie::new();
        trie.insert(net("10.0.0.0/22"), "covering");
        trie.insert(net("10.0.0.0/24"), "a");
        trie.insert(net("10.0.1.0/24"), "b");

        assert_eq!(trie.remove(&net("10.0.0.0/24")), Some("a"));
        assert_eq!(trie.get(&net("10.0.0.0/22")), Some(&"covering"));
        assert_eq!(trie.get(&net("10.0.1.0/24")), Some(&"b"));
        assert_eq!(trie.get(&net("10.0.0.0/24")), None);
        assert_eq!(trie.len(), 2);

        let (prefix, _) = trie.longest_match(addr("10.0.0.7")).unwrap();
        assert_eq!(prefix, net("10.0.0.0/22"));
    }

    #[test]
    fn remove_missing_is_noop() {
        let mut trie = PrefixTrie::new();
        trie.insert(net("10.0.0.0/8"), 1);
        assert_eq!(trie.remove(&net("10.0.0.0/9")), None);
        assert_eq!(trie.remove(&net("11.0.0.0/8")), None);
        assert_eq!(trie.remove(&net("10.0.0.0/7")), None);
        assert_eq!(trie.len(), 1);
    }

    #[test]
    fn glue_nodes_are_not_entries() {
        let mut trie = PrefixTrie::new();
        trie.insert(net("10.0.0.0/24"), 1);
        trie.insert(net("10.0.128.0/24"), 2);
        // Both hang off a glue node at 10.0.0.0/16.
        assert_eq!(trie.get(&net("10.0.0.0/16")), None);
        assert_eq!(trie.remove(&net("10.0.0.0/16")), None);
        assert!(trie.longest_match(addr("10.0.64.1")).is_none());

        trie.remove(&net("10.0.0.0/24"));
        trie.remove(&net("10.0.128.0/24"));
        assert!(trie.is_empty());
        assert!(trie.root.is_none());
    }

    #[test]
    fn covering_prefix_inserted_after_more_specific() {
        let mut trie = PrefixTrie::new();
        trie.insert(net("10.1.0.0/16"), "sixteen");
        trie.insert(net("10.200.0.0/16"), "other");
        trie.insert(net("10.0.0.0/8"), "eight");

        assert_eq!(trie.len(), 3);
        assert_eq!(trie.get(&net("10.0.0.0/8")), Some(&"eight"));
        assert_eq!(trie.longest_match(addr("10.1.9.9")).unwrap().1, &"sixteen");
        assert_eq!(trie.longest_match(addr("10.200.1.1")).unwrap().1, &"other");
        assert_eq!(trie.longest_match(addr("10.7.0.1")).unwrap().1, &"eight");

        trie.remove(&net("10.0.0.0/8"));
        assert_eq!(trie.get(&net("10.1.0.0/16")), Some(&"sixteen"));
        assert_eq!(trie.get(&net("10.200.0.0/16")), Some(&"other"));
    }

    #[test]
    fn default_route_and_host_routes() {
        let mut trie = PrefixTrie::new();
        trie.insert(net("0.0.0.0/0"), "default");
        trie.insert(net("203.0.113.9/32"), "host");

        assert_eq!(trie.longest_match(addr("203.0.113.9")).unwrap().1, &"host");
        assert_eq!(trie.longest_match(addr("203.0.113.8")).unwrap().1, &"default");
        assert_eq!(trie.longest_match(addr("255.255.255.255")).unwrap().1, &"default");
    }

    #[test]
    fn iter_orders_by_address_then_length() {
        let mut trie = PrefixTrie::new();
        for p in ["192.168.0.0/16", "10.1.0.0/16", "10.0.0.0/8", "10.0.0.0/16"] {
            trie.insert(net(p), ());
        }
        let got: Vec<_> = trie.iter().map(|(p, _)| p).collect();
        assert_eq!(
            got,
            vec![
                net("10.0.0.0/8"),
                net("10.0.0.0/16"),
                net("10.1.0.0/16"),
                net("192.168.0.0/16"),
            ]
        );
    }
}
