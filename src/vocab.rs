//! Built-in label tables for acg.78dm.net listing pages.

/// Anchor texts that are page chrome. Compared against the whole trimmed text, case-insensitive.
pub const CHROME_TOKENS: &[&str] = &[
    "更多", "显示", "隐藏", "加载", "级别分类详情",
    "more", "show", "hide", "loading", "category details",
];

/// Chrome fragments that reject an anchor wherever they appear in its text.
pub const CHROME_FRAGMENTS: &[&str] = &["更多", "显示", "隐藏", "加载", "级别分类详情"];

/// Tokens of a "<keyword>共<N>款" section header.
pub const COUNT_CONNECTOR: &str = "共";
pub const COUNT_UNIT: &str = "款";

/// Entries listed on a page that never shipped.
pub const PLACEHOLDER_MARKERS: &[&str] = &["未商品化"];

pub const DEFAULT_SUBCATEGORY: &str = "普通版";
pub const REFERENCE_SUBCATEGORY: &str = "参考出品/开发中";

/// (keyword as printed in the header, stored label)
pub const STANDARD_SECTIONS: &[(&str, &str)] = &[
    ("普通版", "普通版"),
    ("网络限定版", "网络限定版"),
    ("其他限定版", "其他限定版"),
    ("EVANGELION系列", "EVANGELION系列"),
    ("勇者王系列", "勇者王系列"),
    ("参考出品/开发中商品", REFERENCE_SUBCATEGORY),
];

/// HGIBO pages share one page with the 1/100 TV line; only the HG 1/144 headers count.
pub const HGIBO_SECTIONS: &[(&str, &str)] = &[
    ("HG 1/144 普通版", "普通版"),
    ("HG 1/144 网络限定版", "网络限定版"),
    ("HG 1/144 其他限定版", "其他限定版"),
];

/// Gunpla grades and neighbouring kit lines that the site cross-links from every grade page.
pub const GRADE_LABELS: &[&str] = &[
    "PG", "MG", "RE/100", "RG", "HG", "HGUC", "HGGTO", "HGBF", "HGBD", "HGBF/BD", "HGIBO",
    "EG", "SD", "SDCS", "30MM", "FM", "MB", "MR魂", "FIX", "R魂", "GU", "FW食玩", "G-FRAME",
    "MSE", "万代机甲", "万代人形", "超合金魂", "BEASTBOX", "MEGABOX", "骨装机兵", "骨装机兵 FA",
    "FA", "FAG", "女神装置", "MODEROID", "千值练", "海洋堂", "threezero", "threezero美系",
    "Hot Toys", "麦克法兰", "Sideshow", "NECA", "MEDICOM", "MEDICOM奇迹可动", "Mezco", "田宫",
    "小号手", "威龙", "MENG", "爱德美", "长谷川", "青岛社", "威骏", "红星",
];

/// Grades offered for hand-entered kits, including ones no listing page produces.
pub const CATALOG_GRADES: &[&str] = &[
    "MG", "RG", "HGUC", "HGGTO", "HGBF/BD", "HGIBO", "EG", "PG", "SD", "SDCS", "30MM", "FM",
    "成品", "国产盗版", "其他",
];

/// Unrelated toy lines injected into the same page structure.
pub const OTHER_LINES: &[&str] = &[
    "变形金刚", "SS系列", "大黄蜂美版", "变5美版", "日经", "MP日版", "G系列", "王国", "地出",
    "TFP美版", "G1", "铁机巧", "DLX",
    "特摄周边", "S.H.Figuarts", "DX假面骑士", "S.I.C", "RAH", "X-PLUS", "S.H.M",
    "假面骑士大集结", "掌动SHODO",
    "潮流玩具", "52TOYS", "POP MART", "末匠", "19八3", "奇谭俱乐部", "撕裂熊", "tokidoki",
    "豆芽水产",
    "科幻机甲", "美系周边", "军模民用",
];

/// Display order for subcategories; anything else sorts after these by name.
pub const SUBCATEGORY_ORDER: &[&str] = &[
    "普通版", "网络限定版", "其他限定版", "EVANGELION系列", "勇者王系列", "参考出品/开发中",
    "Unleashed", "定制部件", "综合系列", "EXtreme", "限定电镀版", "竞赛奖品版", "水晶版",
    "彩色电镀版", "特别版", "HG U.C.Hard Graph", "1/144系列", "HG创战元宇宙", "HG高达创形者",
    "HG高达创战者", "HAROPLA", "特殊限定版", "超级机器人系列", "拓展部件",
];

/// Position of a subcategory in display order; unknown labels go last.
pub fn subcategory_rank(label: &str) -> usize {
    SUBCATEGORY_ORDER
        .iter()
        .position(|s| *s == label)
        .unwrap_or(SUBCATEGORY_ORDER.len())
}
