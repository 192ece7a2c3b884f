#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageItem {
    Page(u32),
    Ellipsis,
}

pub fn window(current: u32, total: u32) -> Vec<PageItem> {
    if total == 0 {
        return Vec::new();
    }
    let current = current.clamp(1, total);

    let pages: Vec<u32> = if total <= 7 {
        (1..=total).collect()
    } else if current <= 4 {
        (1..=7).collect()
    } else if current >= total - 3 {
        (total - 6..=total).collect()
    } else {
        (current - 3..=current + 3).collect()
    };

    let mut items: Vec<PageItem> = pages.iter().copied().map(PageItem::Page).collect();
    if let Some(&last) = pages.last()
        && last != total
    {
        items.push(PageItem::Ellipsis);
        items.push(PageItem::Page(total));
    }
    items
}
